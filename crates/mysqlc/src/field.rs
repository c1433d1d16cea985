//! Result-set field descriptors.
//!
//! A [`Field`] is the parsed form of one column-definition packet. Fields
//! are immutable once parsed and are owned by the result set that read them.

use crate::protocol::PacketReader;

/// MySQL column type codes, as they appear in column-definition packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    /// DECIMAL
    Decimal = 0x00,
    /// TINYINT
    Tiny = 0x01,
    /// SMALLINT
    Short = 0x02,
    /// INT
    Long = 0x03,
    /// FLOAT
    Float = 0x04,
    /// DOUBLE
    Double = 0x05,
    /// NULL
    Null = 0x06,
    /// TIMESTAMP
    Timestamp = 0x07,
    /// BIGINT
    LongLong = 0x08,
    /// MEDIUMINT
    Int24 = 0x09,
    /// DATE
    Date = 0x0A,
    /// TIME
    Time = 0x0B,
    /// DATETIME
    DateTime = 0x0C,
    /// YEAR
    Year = 0x0D,
    /// Internal DATE variant
    NewDate = 0x0E,
    /// VARCHAR
    VarChar = 0x0F,
    /// BIT
    Bit = 0x10,
    /// JSON
    Json = 0xF5,
    /// DECIMAL (5.0+)
    NewDecimal = 0xF6,
    /// ENUM
    Enum = 0xF7,
    /// SET
    Set = 0xF8,
    /// TINYBLOB / TINYTEXT
    TinyBlob = 0xF9,
    /// MEDIUMBLOB / MEDIUMTEXT
    MediumBlob = 0xFA,
    /// LONGBLOB / LONGTEXT
    LongBlob = 0xFB,
    /// BLOB / TEXT
    Blob = 0xFC,
    /// VARCHAR (internal)
    VarString = 0xFD,
    /// CHAR
    String = 0xFE,
    /// GEOMETRY
    Geometry = 0xFF,
}

impl FieldType {
    /// Parse a type code. Unknown codes decay to `String`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => FieldType::String,
        }
    }

    /// Integer types (including YEAR).
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Tiny
                | FieldType::Short
                | FieldType::Long
                | FieldType::LongLong
                | FieldType::Int24
                | FieldType::Year
        )
    }

    /// Character-string types.
    pub const fn is_string(self) -> bool {
        matches!(
            self,
            FieldType::VarChar
                | FieldType::VarString
                | FieldType::String
                | FieldType::Enum
                | FieldType::Set
        )
    }

    /// BLOB-family types.
    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob
        )
    }

    /// Date/time types.
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date
                | FieldType::NewDate
                | FieldType::Time
                | FieldType::DateTime
                | FieldType::Timestamp
        )
    }
}

/// Column flag bits from the column-definition packet.
#[allow(dead_code)]
pub mod flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
    pub const NO_DEFAULT_VALUE: u16 = 4096;
    pub const ON_UPDATE_NOW: u16 = 8192;
    pub const NUM: u16 = 32768;
}

/// One column of a result set.
#[derive(Debug, Clone)]
pub struct Field {
    /// Catalog name, "def" on every current server
    pub catalog: String,
    /// Database the column comes from
    pub schema: String,
    /// Table name or alias
    pub table: String,
    /// Original table name
    pub org_table: String,
    /// Column name or alias
    pub name: String,
    /// Original column name
    pub org_name: String,
    /// Character set id
    pub charset: u16,
    /// Declared column length
    pub length: u32,
    /// Longest value observed in this result. Only meaningful for buffered
    /// results; stays 0 for streaming ones.
    pub max_length: u32,
    /// Column type code
    pub field_type: FieldType,
    /// Flag bitmask
    pub flags: u16,
    /// Decimal digits
    pub decimals: u8,
}

impl Field {
    /// Parse a column-definition packet payload (protocol 4.1 layout).
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut r = PacketReader::new(payload);

        let catalog = r.read_lenenc_string()?;
        let schema = r.read_lenenc_string()?;
        let table = r.read_lenenc_string()?;
        let org_table = r.read_lenenc_string()?;
        let name = r.read_lenenc_string()?;
        let org_name = r.read_lenenc_string()?;

        // Length of the fixed-size tail, always 0x0c.
        let _fixed = r.read_lenenc_int()?;

        let charset = r.read_u16_le()?;
        let length = r.read_u32_le()?;
        let field_type = FieldType::from_u8(r.read_u8()?);
        let flags = r.read_u16_le()?;
        let decimals = r.read_u8()?;

        Some(Self {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset,
            length,
            max_length: 0,
            field_type,
            flags,
            decimals,
        })
    }

    /// Is the column declared NOT NULL?
    pub const fn is_not_null(&self) -> bool {
        self.flags & flags::NOT_NULL != 0
    }

    /// Is the column part of the primary key?
    pub const fn is_primary_key(&self) -> bool {
        self.flags & flags::PRIMARY_KEY != 0
    }

    /// Is the column unsigned?
    pub const fn is_unsigned(&self) -> bool {
        self.flags & flags::UNSIGNED != 0
    }

    /// Is the column auto-increment?
    pub const fn is_auto_increment(&self) -> bool {
        self.flags & flags::AUTO_INCREMENT != 0
    }

    /// Does the column hold binary rather than character data?
    pub const fn is_binary(&self) -> bool {
        self.flags & flags::BINARY != 0
    }
}
