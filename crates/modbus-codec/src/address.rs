//! Modicon-style register address parsing: a plain decimal string whose
//! numeric range selects the function-code family (1–9999 coils, 10001–
//! 19999 discrete inputs, 30001–39999 input registers, 40001–49999 holding
//! registers). The offset within each family is 1-based in the address
//! string and converted here to the 0-based address the wire format uses.
//!
//! `unit_id` is not part of this grammar — register addresses are a
//! per-tag string, `unit_id` a per-device config value, so callers parse
//! the address and attach the device's unit id to the result themselves.

use crate::error::CodecError;
use gw_protocol::{FunctionCode, ParsedAddress};

const MAX_QUANTITY: u16 = 125;

const COIL_RANGE: (u32, u32) = (1, 9999);
const DISCRETE_INPUT_RANGE: (u32, u32) = (10001, 19999);
const INPUT_REGISTER_RANGE: (u32, u32) = (30001, 39999);
const HOLDING_REGISTER_RANGE: (u32, u32) = (40001, 49999);

fn family_for(number: u32) -> Option<(FunctionCode, u32)> {
    if number >= COIL_RANGE.0 && number <= COIL_RANGE.1 {
        Some((FunctionCode::Coil, COIL_RANGE.0))
    } else if number >= DISCRETE_INPUT_RANGE.0 && number <= DISCRETE_INPUT_RANGE.1 {
        Some((FunctionCode::DiscreteInput, DISCRETE_INPUT_RANGE.0))
    } else if number >= INPUT_REGISTER_RANGE.0 && number <= INPUT_REGISTER_RANGE.1 {
        Some((FunctionCode::InputRegister, INPUT_REGISTER_RANGE.0))
    } else if number >= HOLDING_REGISTER_RANGE.0 && number <= HOLDING_REGISTER_RANGE.1 {
        Some((FunctionCode::HoldingRegister, HOLDING_REGISTER_RANGE.0))
    } else {
        None
    }
}

fn range_origin(function_code: FunctionCode) -> u32 {
    match function_code {
        FunctionCode::Coil => COIL_RANGE.0,
        FunctionCode::DiscreteInput => DISCRETE_INPUT_RANGE.0,
        FunctionCode::InputRegister => INPUT_REGISTER_RANGE.0,
        FunctionCode::HoldingRegister => HOLDING_REGISTER_RANGE.0,
    }
}

/// Parses a decimal Modicon register number into a `ParsedAddress::Register`
/// with `count = 1` and `unit_id = 0` — the caller fills in the real
/// `unit_id` from the device's configuration.
pub fn parse_address(s: &str) -> Result<ParsedAddress, CodecError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidAddress(s.to_string()));
    }
    let number: u32 = s
        .parse()
        .map_err(|_| CodecError::InvalidAddress(s.to_string()))?;
    let (function_code, origin) =
        family_for(number).ok_or_else(|| CodecError::InvalidAddress(s.to_string()))?;
    let register_address = (number - origin) as u16;

    Ok(ParsedAddress::Register {
        function_code,
        register_address,
        count: 1,
        unit_id: 0,
    })
}

/// Renders a `ParsedAddress::Register` back into the decimal Modicon string
/// `parse_address` accepts — the left inverse satisfying
/// `parse_address(format_register_address(a)) == a` (up to `count`/`unit_id`,
/// which the string grammar does not carry).
pub fn format_register_address(addr: &ParsedAddress) -> String {
    match addr {
        ParsedAddress::Register {
            function_code,
            register_address,
            ..
        } => (range_origin(*function_code) + *register_address as u32).to_string(),
        _ => String::new(),
    }
}

/// Validates that an address is writable: single coils and holding
/// registers only, matching function codes 5, 6, 15, 16.
pub fn validate_for_write(addr: &ParsedAddress) -> Result<(), CodecError> {
    match addr {
        ParsedAddress::Register {
            function_code: FunctionCode::Coil,
            ..
        }
        | ParsedAddress::Register {
            function_code: FunctionCode::HoldingRegister,
            ..
        } => Ok(()),
        ParsedAddress::Register { .. } => Err(CodecError::InvalidAddress(
            "discrete inputs and input registers are read-only".to_string(),
        )),
        _ => Err(CodecError::InvalidAddress(
            "not a register address".to_string(),
        )),
    }
}

/// Checks `count` against the MODBUS Application Protocol v1.1b3 per-request
/// quantity limit. Called by the handler once it knows how many registers a
/// planned batch needs — the address string itself never carries a count.
pub fn validate_count(count: u16) -> Result<(), CodecError> {
    if count == 0 || count > MAX_QUANTITY {
        return Err(CodecError::CountOutOfRange {
            requested: count,
            max: MAX_QUANTITY,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_holding_register() {
        let addr = parse_address("40001").unwrap();
        assert_eq!(
            addr,
            ParsedAddress::Register {
                function_code: FunctionCode::HoldingRegister,
                register_address: 0,
                count: 1,
                unit_id: 0,
            }
        );
    }

    #[test]
    fn parses_coil() {
        let addr = parse_address("13").unwrap();
        assert_eq!(
            addr,
            ParsedAddress::Register {
                function_code: FunctionCode::Coil,
                register_address: 12,
                count: 1,
                unit_id: 0,
            }
        );
    }

    #[test]
    fn family_boundaries_parse_correctly() {
        for (s, expected_fc, expected_addr) in [
            ("1", FunctionCode::Coil, 0u16),
            ("9999", FunctionCode::Coil, 9998),
            ("10001", FunctionCode::DiscreteInput, 0),
            ("19999", FunctionCode::DiscreteInput, 9998),
            ("30001", FunctionCode::InputRegister, 0),
            ("39999", FunctionCode::InputRegister, 9998),
            ("40001", FunctionCode::HoldingRegister, 0),
            ("49999", FunctionCode::HoldingRegister, 9998),
        ] {
            let addr = parse_address(s).unwrap();
            match addr {
                ParsedAddress::Register {
                    function_code,
                    register_address,
                    ..
                } => {
                    assert_eq!(function_code, expected_fc, "address {s}");
                    assert_eq!(register_address, expected_addr, "address {s}");
                }
                _ => panic!("expected a register address"),
            }
        }
    }

    #[test]
    fn rejects_zero_and_out_of_range_numbers() {
        assert!(parse_address("0").is_err());
        assert!(parse_address("50000").is_err());
        assert!(parse_address("20001").is_err());
        assert!(parse_address("29999").is_err());
    }

    #[test]
    fn rejects_malformed_string() {
        assert!(parse_address("garbage").is_err());
        assert!(parse_address("").is_err());
        assert!(parse_address("-1").is_err());
        assert!(parse_address("1:40001").is_err());
    }

    #[test]
    fn format_register_address_is_the_left_inverse_of_parse() {
        for s in ["1", "9999", "10001", "19999", "30001", "39999", "40001", "49999"] {
            let parsed = parse_address(s).unwrap();
            assert_eq!(format_register_address(&parsed), s);
        }
    }

    #[test]
    fn validate_for_write_rejects_input_register() {
        let addr = ParsedAddress::Register {
            function_code: FunctionCode::InputRegister,
            register_address: 0,
            count: 1,
            unit_id: 1,
        };
        assert!(validate_for_write(&addr).is_err());
    }

    #[test]
    fn validate_for_write_accepts_holding_register() {
        let addr = parse_address("40001").unwrap();
        assert!(validate_for_write(&addr).is_ok());
    }

    #[test]
    fn validate_count_rejects_zero_and_above_max() {
        assert!(validate_count(0).is_err());
        assert!(validate_count(125).is_ok());
        assert!(validate_count(200).is_err());
    }
}
