use sl427_frame::decode_frame;
use sl427_message::{DataItemRegistry, UserData};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, message_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, MessageOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.hex.is_empty() {
        return Err(CliError::usage("decode needs a hex-encoded frame"));
    }
    let wire = parse_hex(&args.hex.join(" "))?;
    let message = decode_wire(&wire)?;

    let out = MessageOutput::new(
        &message,
        &wire,
        "-",
        &DataItemRegistry::with_station_defaults(),
    );
    print_message(&out, &wire, format);
    Ok(SUCCESS)
}

fn decode_wire(wire: &[u8]) -> CliResult<UserData> {
    let frame = decode_frame(wire).map_err(|err| frame_error("invalid frame", err))?;
    UserData::from_frame(&frame).map_err(|err| message_error("invalid user data", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::DATA_INVALID;

    #[test]
    fn decodes_heartbeat() {
        let wire = parse_hex("68 07 68 80 21 05 25 04 D2 C0 18 16").expect("hex should parse");
        let message = decode_wire(&wire).expect("heartbeat should decode");
        assert_eq!(message.address.station_string(), "2105251234");
        assert!(message.data.is_empty());
    }

    #[test]
    fn checksum_mismatch_is_data_invalid() {
        let wire = parse_hex("68 07 68 80 21 05 25 04 D2 C0 19 16").expect("hex should parse");
        let err = decode_wire(&wire).expect_err("bad checksum should fail");
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.contains("checksum"));
    }
}
