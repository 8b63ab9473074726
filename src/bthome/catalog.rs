//! Static BTHome v2 field table for the WS90 weather station
//!
//! Every field the WS90 advertises is listed here with its integer layout
//! and scale factor. The table is built at compile time and never mutated.

/// Integer layout of a BTHome field value (little-endian on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint24,
    Int24,
}

impl FieldFormat {
    /// Number of value bytes following the field id
    pub const fn width(self) -> usize {
        match self {
            FieldFormat::Uint8 | FieldFormat::Int8 => 1,
            FieldFormat::Uint16 | FieldFormat::Int16 => 2,
            FieldFormat::Uint24 | FieldFormat::Int24 => 3,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            FieldFormat::Int8 | FieldFormat::Int16 | FieldFormat::Int24
        )
    }
}

/// One decodable field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDefinition {
    pub id: u8,
    pub name: &'static str,
    pub format: FieldFormat,
    /// Multiplier applied after integer decoding, `None` means 1
    pub scale: Option<f64>,
    /// Name used for the second occurrence of this id in one envelope
    pub repeat_name: Option<&'static str>,
}

impl FieldDefinition {
    const fn new(id: u8, name: &'static str, format: FieldFormat, scale: Option<f64>) -> Self {
        FieldDefinition {
            id,
            name,
            format,
            scale,
            repeat_name: None,
        }
    }

    const fn repeated_as(mut self, repeat_name: &'static str) -> Self {
        self.repeat_name = Some(repeat_name);
        self
    }
}

/// Field id of the packet counter used for duplicate suppression
pub const PACKET_ID: u8 = 0x00;

/// Lookup table indexed directly by field id
pub struct FieldCatalog {
    fields: [Option<FieldDefinition>; 256],
}

impl FieldCatalog {
    const fn from_definitions(definitions: &[FieldDefinition]) -> Self {
        let mut fields = [None; 256];
        let mut i = 0;
        while i < definitions.len() {
            let def = definitions[i];
            fields[def.id as usize] = Some(def);
            i += 1;
        }
        FieldCatalog { fields }
    }

    /// Look up a field id. `None` is an unknown field, not an error.
    pub fn lookup(&self, id: u8) -> Option<&FieldDefinition> {
        self.fields[id as usize].as_ref()
    }
}

const WS90_FIELDS: [FieldDefinition; 13] = [
    FieldDefinition::new(PACKET_ID, "pid", FieldFormat::Uint8, None),
    FieldDefinition::new(0x01, "battery", FieldFormat::Uint8, None),
    FieldDefinition::new(0x04, "pressure", FieldFormat::Uint24, Some(0.01)),
    FieldDefinition::new(0x05, "illuminance", FieldFormat::Uint24, Some(0.01)),
    FieldDefinition::new(0x08, "dew_point", FieldFormat::Int16, Some(0.01)),
    FieldDefinition::new(0x0C, "capacitor_voltage", FieldFormat::Uint16, Some(0.001)),
    FieldDefinition::new(0x20, "rain_status", FieldFormat::Uint8, None),
    FieldDefinition::new(0x2E, "humidity", FieldFormat::Uint8, None),
    // WS90 sends 0x44 twice per packet: average wind first, then gust
    FieldDefinition::new(0x44, "wind_speed", FieldFormat::Uint16, Some(0.01))
        .repeated_as("gust_speed"),
    FieldDefinition::new(0x45, "temperature", FieldFormat::Int16, Some(0.1)),
    FieldDefinition::new(0x46, "uv", FieldFormat::Uint8, Some(0.1)),
    FieldDefinition::new(0x5E, "wind_direction", FieldFormat::Uint16, Some(0.01)),
    FieldDefinition::new(0x5F, "precipitation", FieldFormat::Uint16, Some(0.1)),
];

/// Fields advertised by the WS90 (BTHome packet types 1 and 2)
pub static WS90_CATALOG: FieldCatalog = FieldCatalog::from_definitions(&WS90_FIELDS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_contains_all_ws90_fields() {
        let defined = (0..=255u8).filter(|&id| WS90_CATALOG.lookup(id).is_some());
        assert_eq!(defined.count(), 13);
        for def in WS90_FIELDS {
            assert_eq!(WS90_CATALOG.lookup(def.id), Some(&def));
        }

        let pressure = WS90_CATALOG.lookup(0x04).unwrap();
        assert_eq!(pressure.name, "pressure");
        assert_eq!(pressure.format.width(), 3);
        assert!(!pressure.format.is_signed());
        assert_eq!(pressure.scale, Some(0.01));

        let dew_point = WS90_CATALOG.lookup(0x08).unwrap();
        assert!(dew_point.format.is_signed());
        assert_eq!(dew_point.format.width(), 2);
    }

    #[test]
    fn test_unknown_id_is_a_miss() {
        assert!(WS90_CATALOG.lookup(0x02).is_none());
        assert!(WS90_CATALOG.lookup(0xFF).is_none());
    }

    #[test]
    fn test_wind_speed_has_gust_repeat_name() {
        let wind = WS90_CATALOG.lookup(0x44).unwrap();
        assert_eq!(wind.name, "wind_speed");
        assert_eq!(wind.repeat_name, Some("gust_speed"));
        assert_eq!(WS90_CATALOG.lookup(0x45).unwrap().repeat_name, None);
    }
}
