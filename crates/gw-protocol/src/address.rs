use serde::{Deserialize, Serialize};

/// Modbus-family function code families, derived from the leading digit
/// block of a register address (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCode {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

/// A protocol-specific address, produced by a codec's address parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedAddress {
    /// Register-addressed (Modbus-family).
    Register {
        function_code: FunctionCode,
        register_address: u16,
        count: u16,
        unit_id: u8,
    },
    /// Object-addressed, symbolic tag name with optional array index.
    Symbolic {
        tag_name: String,
        array_index: Option<u32>,
    },
    /// Object-addressed, class/instance/attribute.
    Instance {
        class_id: u16,
        instance_id: u32,
        attribute_id: u16,
    },
}

impl ParsedAddress {
    pub fn is_register(&self) -> bool {
        matches!(self, ParsedAddress::Register { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_address_is_register() {
        let addr = ParsedAddress::Register {
            function_code: FunctionCode::HoldingRegister,
            register_address: 100,
            count: 1,
            unit_id: 1,
        };
        assert!(addr.is_register());
    }

    #[test]
    fn symbolic_address_is_not_register() {
        let addr = ParsedAddress::Symbolic {
            tag_name: "Motor1.Speed".into(),
            array_index: Some(2),
        };
        assert!(!addr.is_register());
    }

    #[test]
    fn serde_tag_discriminates_variants() {
        let addr = ParsedAddress::Instance {
            class_id: 0x04,
            instance_id: 100,
            attribute_id: 3,
        };
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("\"kind\":\"instance\""));
        let round_tripped: ParsedAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, addr);
    }
}
