use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use sl427_message::{code, Address, Afn, DataItemRegistry, DataPayload, UserData};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize, Debug)]
pub struct MessageOutput {
    pub peer: String,
    pub direction: &'static str,
    pub control: u8,
    pub code: &'static str,
    pub frame_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_count: Option<u8>,
    pub address_kind: &'static str,
    pub address: String,
    pub afn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_afn: Option<u8>,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_label: Option<String>,
    pub raw: String,
    pub timestamp: String,
}

impl MessageOutput {
    pub fn new(message: &UserData, wire: &[u8], peer: &str, registry: &DataItemRegistry) -> Self {
        let control = &message.control;
        Self {
            peer: peer.to_string(),
            direction: control.direction().as_str(),
            control: control.value(),
            code: code::name(control.code()),
            frame_count: control.frame_count(),
            split_count: control.split_count(),
            address_kind: match message.address {
                Address::Admin(_) => "admin",
                Address::Coded(_) => "coded",
            },
            address: message.address.station_string(),
            afn: message.afn.to_string(),
            user_afn: message.user_afn,
            data: hex::encode_upper(&message.data),
            items: payload_items(message, registry),
            password: message.password,
            time_label: message.time_label.map(|label| label.to_string()),
            raw: hex::encode_upper(wire),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Upload data rendered through the registry, when it parses as a data-item
/// payload.
fn payload_items(message: &UserData, registry: &DataItemRegistry) -> Option<Vec<String>> {
    if !message.control.is_uplink() || message.afn != Afn::UPLOAD || message.data.is_empty() {
        return None;
    }
    let payload = DataPayload::decode(&message.data).ok()?;
    Some(
        payload
            .items
            .iter()
            .map(|item| registry.format_item(item))
            .collect(),
    )
}

pub fn print_message(out: &MessageOutput, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in rows(out) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "peer={} {} {} fcb={} address={} afn={}",
                out.peer,
                out.direction,
                out.code,
                out.frame_count,
                out.address,
                out.afn
            );
            if let Some(items) = &out.items {
                line.push_str(&format!(" items=[{}]", items.join(", ")));
            } else if !out.data.is_empty() {
                line.push_str(&format!(" data={}", out.data));
            }
            if let Some(label) = &out.time_label {
                line.push_str(&format!(" time={label}"));
            }
            println!("{line}");
        }
        OutputFormat::Raw => print_raw(wire),
    }
}

fn rows(out: &MessageOutput) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("peer", out.peer.clone()),
        ("direction", out.direction.to_string()),
        ("control", format!("0x{:02X} ({})", out.control, out.code)),
        ("frame count", out.frame_count.to_string()),
    ];
    if let Some(split) = out.split_count {
        rows.push(("split count", split.to_string()));
    }
    rows.push(("address", format!("{} ({})", out.address, out.address_kind)));
    rows.push(("afn", out.afn.clone()));
    if let Some(user_afn) = out.user_afn {
        rows.push(("user afn", format!("0x{user_afn:02X}")));
    }
    rows.push(("data", out.data.clone()));
    if let Some(items) = &out.items {
        for item in items {
            rows.push(("item", item.clone()));
        }
    }
    if let Some(password) = out.password {
        rows.push(("password", format!("0x{password:04X}")));
    }
    if let Some(label) = &out.time_label {
        rows.push(("time label", label.clone()));
    }
    rows.push(("raw", out.raw.clone()));
    rows
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use sl427_message::{AdminAddress, Control, DataItem, DataValue};

    use super::*;

    fn upload() -> UserData {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
            .and_then(|d| d.and_hms_opt(10, 30, 5))
            .expect("valid timestamp");
        let payload = DataPayload::new(ts, vec![DataItem::new(1001, DataValue::Int32(12345))]);
        UserData::new(
            Control::uplink(code::WATER_LEVEL),
            Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address")),
            Afn::UPLOAD,
        )
        .with_data(payload.encode().expect("payload should encode"))
    }

    #[test]
    fn output_renders_upload_items() {
        let message = upload();
        let wire = message.to_frame_bytes().expect("message should frame");
        let out = MessageOutput::new(
            &message,
            &wire,
            "127.0.0.1:5000",
            &DataItemRegistry::with_station_defaults(),
        );

        assert_eq!(out.direction, "uplink");
        assert_eq!(out.code, "water-level");
        assert_eq!(out.address, "2105251234");
        assert_eq!(out.address_kind, "admin");
        assert_eq!(out.items, Some(vec!["water_level=12.345m".to_string()]));
        assert!(out.raw.starts_with("68"));
        assert!(out.raw.ends_with("16"));
    }

    #[test]
    fn json_skips_absent_fields() {
        let message = UserData::new(
            Control::uplink(code::CONFIRM),
            Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address")),
            Afn::UPLOAD,
        );
        let out = MessageOutput::new(&message, &[], "p", &DataItemRegistry::new());
        let json = serde_json::to_string(&out).expect("output should serialize");

        assert!(json.contains("\"afn\":\"upload(0xC0)\""));
        assert!(!json.contains("password"));
        assert!(!json.contains("items"));
    }

    #[test]
    fn table_rows_include_optional_fields() {
        let message = upload().with_password(0x0102);
        let out = MessageOutput::new(&message, &[], "p", &DataItemRegistry::new());
        let fields: Vec<&str> = rows(&out).iter().map(|(field, _)| *field).collect();
        assert!(fields.contains(&"password"));
        assert!(fields.contains(&"item"));
    }
}
