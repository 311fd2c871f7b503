use std::collections::HashMap;

use crate::payload::{DataItem, DataValue, TYPE_INT16, TYPE_INT32, TYPE_INT8, TYPE_STRING};

/// Display metadata for one data-item id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItemDef {
    pub id: u16,
    pub name: String,
    /// Expected wire type byte.
    pub value_type: u8,
    pub unit: String,
    /// Power of ten applied to integer values; `-3` divides by 1000.
    pub scale: i32,
    pub description: String,
}

impl DataItemDef {
    pub fn new(id: u16, name: impl Into<String>, value_type: u8) -> Self {
        Self {
            id,
            name: name.into(),
            value_type,
            unit: String::new(),
            scale: 0,
            description: String::new(),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Render a value with scale and unit, e.g. `12345` at scale `-3` in
    /// metres is `12.345m`.
    ///
    /// A value whose type does not match the definition is printed raw.
    pub fn format_value(&self, value: &DataValue) -> String {
        let matches_type = value.type_code() == self.value_type;
        match value {
            DataValue::Text(text) if matches_type => text.clone(),
            _ if matches_type => match value.as_i64() {
                Some(raw) => {
                    let scaled = raw as f64 * 10f64.powi(self.scale);
                    let decimals = usize::try_from(-self.scale).unwrap_or(0);
                    format!("{scaled:.decimals$}{}", self.unit)
                }
                None => value.to_string(),
            },
            _ => value.to_string(),
        }
    }
}

/// Data-item definitions keyed by id.
///
/// Populated once at startup, then shared read-only (for example behind an
/// `Arc`).
#[derive(Debug, Clone, Default)]
pub struct DataItemRegistry {
    items: HashMap<u16, DataItemDef>,
}

impl DataItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, replacing any previous one with the same id.
    pub fn register(&mut self, def: DataItemDef) {
        self.items.insert(def.id, def);
    }

    pub fn register_batch(&mut self, defs: impl IntoIterator<Item = DataItemDef>) {
        for def in defs {
            self.register(def);
        }
    }

    pub fn get(&self, id: u16) -> Option<&DataItemDef> {
        self.items.get(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.items.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// `name=value` using the registered definition, or `#id=raw` for
    /// unknown ids.
    pub fn format_item(&self, item: &DataItem) -> String {
        match self.get(item.id) {
            Some(def) => format!("{}={}", def.name, def.format_value(&item.value)),
            None => format!("#{}={}", item.id, item.value),
        }
    }

    /// Definitions for the sample measurements the bundled station emits.
    pub fn with_station_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_batch([
            DataItemDef::new(1001, "water_level", TYPE_INT32)
                .with_unit("m")
                .with_scale(-3)
                .with_description("station water level"),
            DataItemDef::new(1002, "flow", TYPE_INT32)
                .with_unit("m³/s")
                .with_scale(-3)
                .with_description("discharge"),
            DataItemDef::new(1003, "ph", TYPE_INT16)
                .with_scale(-2)
                .with_description("water quality pH"),
            DataItemDef::new(1004, "water_temp", TYPE_INT16)
                .with_unit("℃")
                .with_scale(-2)
                .with_description("water temperature"),
            DataItemDef::new(1005, "status", TYPE_STRING).with_description("device status"),
            DataItemDef::new(1006, "battery_flag", TYPE_INT8),
        ]);
        registry
    }
}
