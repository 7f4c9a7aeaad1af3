use super::{EncodeOptions, TypeCodec, sql_literal};
use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};
use crate::value::Value;

/// Builtin backend types known without a catalog lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PgType {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Text,
    Varchar,
    Bpchar,
    Name,
    Bytea,
    OidVector,
    Refcursor,
    Record,
    Unknown,
}

const ALL: [PgType; 17] = [
    PgType::Bool,
    PgType::Int2,
    PgType::Int4,
    PgType::Int8,
    PgType::Oid,
    PgType::Float4,
    PgType::Float8,
    PgType::Numeric,
    PgType::Text,
    PgType::Varchar,
    PgType::Bpchar,
    PgType::Name,
    PgType::Bytea,
    PgType::OidVector,
    PgType::Refcursor,
    PgType::Record,
    PgType::Unknown,
];

impl PgType {
    /// Every builtin type, for seeding a session's type catalog.
    pub fn all() -> &'static [PgType] {
        &ALL
    }

    /// Look up a builtin type by OID.
    pub fn from_oid(type_oid: Oid) -> Option<Self> {
        ALL.iter().copied().find(|t| t.type_oid() == type_oid)
    }

    /// Look up a builtin type by name or common SQL alias.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let canonical = match name.as_str() {
            "boolean" => "bool",
            "smallint" => "int2",
            "integer" | "int" => "int4",
            "bigint" => "int8",
            "real" => "float4",
            "double precision" => "float8",
            "decimal" => "numeric",
            "character varying" => "varchar",
            "character" | "char" => "bpchar",
            other => other,
        };
        ALL.iter().copied().find(|t| t.type_name() == canonical)
    }

    /// Type a parameter takes when only its value is known.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Null | Value::Text(_) => PgType::Text,
            Value::Bool(_) => PgType::Bool,
            Value::Int16(_) => PgType::Int2,
            Value::Int32(_) => PgType::Int4,
            Value::Int64(_) => PgType::Int8,
            Value::Float32(_) => PgType::Float4,
            Value::Float64(_) => PgType::Float8,
            Value::Numeric(_) => PgType::Numeric,
            Value::Bytes(_) => PgType::Bytea,
        }
    }

    /// Whether result columns of `type_oid` are requested in binary format.
    pub fn supports_binary_oid(type_oid: Oid) -> bool {
        Self::from_oid(type_oid).is_some_and(|t| t.supports_binary())
    }

    fn type_oid(self) -> Oid {
        match self {
            PgType::Bool => oid::BOOL,
            PgType::Int2 => oid::INT2,
            PgType::Int4 => oid::INT4,
            PgType::Int8 => oid::INT8,
            PgType::Oid => oid::OID,
            PgType::Float4 => oid::FLOAT4,
            PgType::Float8 => oid::FLOAT8,
            PgType::Numeric => oid::NUMERIC,
            PgType::Text => oid::TEXT,
            PgType::Varchar => oid::VARCHAR,
            PgType::Bpchar => oid::BPCHAR,
            PgType::Name => oid::NAME,
            PgType::Bytea => oid::BYTEA,
            PgType::OidVector => oid::OIDVECTOR,
            PgType::Refcursor => oid::REFCURSOR,
            PgType::Record => oid::RECORD,
            PgType::Unknown => oid::UNKNOWN,
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            PgType::Bool => "bool",
            PgType::Int2 => "int2",
            PgType::Int4 => "int4",
            PgType::Int8 => "int8",
            PgType::Oid => "oid",
            PgType::Float4 => "float4",
            PgType::Float8 => "float8",
            PgType::Numeric => "numeric",
            PgType::Text => "text",
            PgType::Varchar => "varchar",
            PgType::Bpchar => "bpchar",
            PgType::Name => "name",
            PgType::Bytea => "bytea",
            PgType::OidVector => "oidvector",
            PgType::Refcursor => "refcursor",
            PgType::Record => "record",
            PgType::Unknown => "unknown",
        }
    }

    fn mismatch(self, value: &Value) -> Error {
        Error::Encode(format!("cannot encode {value:?} as {}", self.type_name()))
    }

    fn integer<T: TryFrom<i64>>(self, value: &Value) -> Result<T> {
        let v = value.as_i64().ok_or_else(|| self.mismatch(value))?;
        T::try_from(v).map_err(|_| Error::Encode(format!("{v} out of range for {}", self.type_name())))
    }

    fn encode_binary(self, value: &Value) -> Result<Vec<u8>> {
        Ok(match self {
            PgType::Bool => match value {
                Value::Bool(b) => vec![u8::from(*b)],
                _ => return Err(self.mismatch(value)),
            },
            PgType::Int2 => self.integer::<i16>(value)?.to_be_bytes().to_vec(),
            PgType::Int4 => self.integer::<i32>(value)?.to_be_bytes().to_vec(),
            PgType::Int8 => self.integer::<i64>(value)?.to_be_bytes().to_vec(),
            PgType::Oid => self.integer::<u32>(value)?.to_be_bytes().to_vec(),
            PgType::Float4 => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
                (v as f32).to_be_bytes().to_vec()
            }
            PgType::Float8 => {
                let v = value.as_f64().ok_or_else(|| self.mismatch(value))?;
                v.to_be_bytes().to_vec()
            }
            PgType::Bytea => match value {
                Value::Bytes(b) => b.clone(),
                Value::Text(s) => s.as_bytes().to_vec(),
                _ => return Err(self.mismatch(value)),
            },
            // text-like types share the UTF-8 representation in both formats
            _ => value.to_text().into_bytes(),
        })
    }
}

impl TypeCodec for PgType {
    fn name(&self) -> &str {
        self.type_name()
    }

    fn oid(&self) -> Oid {
        self.type_oid()
    }

    fn supports_binary(&self) -> bool {
        !matches!(
            self,
            PgType::Numeric | PgType::OidVector | PgType::Record | PgType::Unknown
        )
    }

    fn uses_size(&self) -> bool {
        matches!(self, PgType::Varchar | PgType::Bpchar)
    }

    fn encode(&self, value: &Value, for_extended: bool, options: &EncodeOptions) -> Result<Vec<u8>> {
        if !for_extended {
            return Ok(sql_literal(value, options).into_bytes());
        }
        if self.supports_binary() {
            self.encode_binary(value)
        } else {
            Ok(value.to_text().into_bytes())
        }
    }
}
