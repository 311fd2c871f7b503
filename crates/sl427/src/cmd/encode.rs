use sl427_message::{Afn, Control, DataItemRegistry, TimeLabel, UserData};

use crate::cmd::{parse_afn, parse_hex, parse_number, EncodeArgs};
use crate::exit::{message_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, MessageOutput, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let message = build_message(&args)?;
    let wire = message
        .to_frame_bytes()
        .map_err(|err| message_error("encode failed", err))?;

    match format {
        OutputFormat::Pretty => println!("{}", hex::encode_upper(&wire)),
        _ => {
            let out = MessageOutput::new(
                &message,
                &wire,
                "-",
                &DataItemRegistry::with_station_defaults(),
            );
            print_message(&out, &wire, format);
        }
    }
    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs) -> CliResult<UserData> {
    let address = args.address.resolve()?;
    let afn = parse_afn(&args.afn)?;
    let code: u8 = parse_number(&args.code, "code")?;
    if code > 0x0F {
        return Err(CliError::usage(format!("code must be 0-15, got {code}")));
    }
    if args.frame_count > 3 {
        return Err(CliError::usage(format!(
            "frame count must be 0-3, got {}",
            args.frame_count
        )));
    }

    let control = if args.downlink {
        Control::downlink(code)
    } else {
        Control::uplink(code)
    }
    .with_frame_count(args.frame_count);

    let mut message = UserData::new(control, address, afn);
    if let Some(user_afn) = &args.user_afn {
        message = message.with_user_afn(parse_number(user_afn, "user AFN")?);
    } else if afn == Afn::USER_DEFINED {
        return Err(CliError::usage("--afn user-defined needs --user-afn"));
    }
    if let Some(data) = &args.data {
        message = message.with_data(parse_hex(data)?);
    }
    if let Some(password) = &args.password {
        message = message.with_password(parse_number(password, "password")?);
    }
    if args.time_label {
        message = message.with_time_label(TimeLabel::now());
    }

    message
        .validate()
        .map_err(|err| message_error("invalid message", err))?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::AddressArgs;
    use crate::exit::{DATA_INVALID, USAGE};

    fn args() -> EncodeArgs {
        EncodeArgs {
            address: AddressArgs {
                admin_code: "210525".to_string(),
                station_id: 1234,
                coded: None,
            },
            afn: "upload".to_string(),
            user_afn: None,
            downlink: false,
            code: "0".to_string(),
            frame_count: 0,
            data: None,
            password: None,
            time_label: false,
        }
    }

    #[test]
    fn heartbeat_matches_known_wire_bytes() {
        let message = build_message(&args()).expect("heartbeat should build");
        let wire = message.to_frame_bytes().expect("heartbeat should frame");
        assert_eq!(hex::encode_upper(&wire), "6807688021052504D2C01816");
    }

    #[test]
    fn downlink_needs_password() {
        let mut downlink = args();
        downlink.downlink = true;
        let err = build_message(&downlink).expect_err("downlink without password should fail");
        assert_eq!(err.code, DATA_INVALID);

        downlink.password = Some("0x0102".to_string());
        let message = build_message(&downlink).expect("downlink with password should build");
        assert_eq!(message.password, Some(0x0102));
    }

    #[test]
    fn user_defined_afn_needs_user_afn() {
        let mut custom = args();
        custom.afn = "user-defined".to_string();
        let err = build_message(&custom).expect_err("missing user AFN should fail");
        assert_eq!(err.code, USAGE);

        custom.user_afn = Some("0x42".to_string());
        let message = build_message(&custom).expect("user AFN should build");
        assert_eq!(message.user_afn, Some(0x42));
    }

    #[test]
    fn out_of_range_fields_are_usage_errors() {
        let mut bad = args();
        bad.code = "16".to_string();
        assert_eq!(build_message(&bad).expect_err("code 16").code, USAGE);

        let mut bad = args();
        bad.frame_count = 4;
        assert_eq!(build_message(&bad).expect_err("frame count 4").code, USAGE);
    }
}
