//! The closed tagged-value model exchanged with the remote engine. Every
//! shape the wire can carry is a variant here, so encode and decode are one
//! exhaustive match each.

use std::fmt;

// -----------------------------------------------------------------------------
// ----- Tags ------------------------------------------------------------------

/// Wire type tags. Negative = scalar atom, positive = homogeneous vector of
/// the same kind, 0 = heterogeneous list, 98 = table, 99 = dict.
pub mod tag {
    pub const LIST: i8 = 0;
    pub const BOOL: i8 = 1;
    pub const BYTE: i8 = 4;
    pub const SHORT: i8 = 5;
    pub const INT: i8 = 6;
    pub const LONG: i8 = 7;
    pub const REAL: i8 = 8;
    pub const FLOAT: i8 = 9;
    pub const CHAR: i8 = 10;
    pub const SYMBOL: i8 = 11;
    pub const TIMESTAMP: i8 = 12;
    pub const MONTH: i8 = 13;
    pub const DATE: i8 = 14;
    pub const DATETIME: i8 = 15;
    pub const TIMESPAN: i8 = 16;
    pub const MINUTE: i8 = 17;
    pub const SECOND: i8 = 18;
    pub const TIME: i8 = 19;
    pub const TABLE: i8 = 98;
    pub const DICT: i8 = 99;
}

// -----------------------------------------------------------------------------
// ----- Value -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    // Atoms. Temporal payloads are raw engine epochs: timestamps/timespans in
    // nanoseconds, dates in days since 2000-01-01, months in months since
    // 2000-01, minutes/seconds in units since midnight, times in
    // milliseconds since midnight, datetimes in fractional days.
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Real(f32),
    Float(f64),
    Char(char),
    Symbol(String),
    Timestamp(i64),
    Month(i32),
    Date(i32),
    DateTime(f64),
    Timespan(i64),
    Minute(i32),
    Second(i32),
    Time(i32),

    // Homogeneous vectors.
    BoolVec(Vec<bool>),
    ByteVec(Vec<u8>),
    ShortVec(Vec<i16>),
    IntVec(Vec<i32>),
    LongVec(Vec<i64>),
    RealVec(Vec<f32>),
    FloatVec(Vec<f64>),
    CharVec(String),
    SymbolVec(Vec<String>),
    TimestampVec(Vec<i64>),
    MonthVec(Vec<i32>),
    DateVec(Vec<i32>),
    DateTimeVec(Vec<f64>),
    TimespanVec(Vec<i64>),
    MinuteVec(Vec<i32>),
    SecondVec(Vec<i32>),
    TimeVec(Vec<i32>),

    // Compound shapes.
    List(Vec<Value>),
    Dict(Box<Dict>),
    Table(Box<Table>),
}

// -----------------------------------------------------------------------------
// ----- Value: Nulls ----------------------------------------------------------

/// Reserved "no value" bit patterns per atom kind. Booleans and bytes have
/// no null form on this wire.
pub mod null {
    pub const SHORT: i16 = i16::MIN;
    pub const INT: i32 = i32::MIN;
    pub const LONG: i64 = i64::MIN;
    pub const REAL: f32 = f32::NAN;
    pub const FLOAT: f64 = f64::NAN;
    pub const CHAR: char = ' ';
}

impl Value {
    /// True when this atom holds its kind's null sentinel. Compound shapes
    /// and vectors are never null themselves.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Short(v) => *v == null::SHORT,
            Value::Int(v) | Value::Month(v) | Value::Date(v) => *v == null::INT,
            Value::Minute(v) | Value::Second(v) | Value::Time(v) => *v == null::INT,
            Value::Long(v) | Value::Timestamp(v) | Value::Timespan(v) => *v == null::LONG,
            Value::Real(v) => v.is_nan(),
            Value::Float(v) | Value::DateTime(v) => v.is_nan(),
            Value::Char(v) => *v == null::CHAR,
            Value::Symbol(v) => v.is_empty(),
            _ => false,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Value: Introspection --------------------------------------------------

impl Value {
    /// The wire tag this value encodes under.
    pub fn tag(&self) -> i8 {
        match self {
            Value::Bool(_) => -tag::BOOL,
            Value::Byte(_) => -tag::BYTE,
            Value::Short(_) => -tag::SHORT,
            Value::Int(_) => -tag::INT,
            Value::Long(_) => -tag::LONG,
            Value::Real(_) => -tag::REAL,
            Value::Float(_) => -tag::FLOAT,
            Value::Char(_) => -tag::CHAR,
            Value::Symbol(_) => -tag::SYMBOL,
            Value::Timestamp(_) => -tag::TIMESTAMP,
            Value::Month(_) => -tag::MONTH,
            Value::Date(_) => -tag::DATE,
            Value::DateTime(_) => -tag::DATETIME,
            Value::Timespan(_) => -tag::TIMESPAN,
            Value::Minute(_) => -tag::MINUTE,
            Value::Second(_) => -tag::SECOND,
            Value::Time(_) => -tag::TIME,
            Value::BoolVec(_) => tag::BOOL,
            Value::ByteVec(_) => tag::BYTE,
            Value::ShortVec(_) => tag::SHORT,
            Value::IntVec(_) => tag::INT,
            Value::LongVec(_) => tag::LONG,
            Value::RealVec(_) => tag::REAL,
            Value::FloatVec(_) => tag::FLOAT,
            Value::CharVec(_) => tag::CHAR,
            Value::SymbolVec(_) => tag::SYMBOL,
            Value::TimestampVec(_) => tag::TIMESTAMP,
            Value::MonthVec(_) => tag::MONTH,
            Value::DateVec(_) => tag::DATE,
            Value::DateTimeVec(_) => tag::DATETIME,
            Value::TimespanVec(_) => tag::TIMESPAN,
            Value::MinuteVec(_) => tag::MINUTE,
            Value::SecondVec(_) => tag::SECOND,
            Value::TimeVec(_) => tag::TIME,
            Value::List(_) => tag::LIST,
            Value::Table(_) => tag::TABLE,
            Value::Dict(_) => tag::DICT,
        }
    }

    /// Human-readable kind name, used in conversion diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Real(_) => "real",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Symbol(_) => "symbol",
            Value::Timestamp(_) => "timestamp",
            Value::Month(_) => "month",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Timespan(_) => "timespan",
            Value::Minute(_) => "minute",
            Value::Second(_) => "second",
            Value::Time(_) => "time",
            Value::BoolVec(_) => "bool vector",
            Value::ByteVec(_) => "byte vector",
            Value::ShortVec(_) => "short vector",
            Value::IntVec(_) => "int vector",
            Value::LongVec(_) => "long vector",
            Value::RealVec(_) => "real vector",
            Value::FloatVec(_) => "float vector",
            Value::CharVec(_) => "char vector",
            Value::SymbolVec(_) => "symbol vector",
            Value::TimestampVec(_) => "timestamp vector",
            Value::MonthVec(_) => "month vector",
            Value::DateVec(_) => "date vector",
            Value::DateTimeVec(_) => "datetime vector",
            Value::TimespanVec(_) => "timespan vector",
            Value::MinuteVec(_) => "minute vector",
            Value::SecondVec(_) => "second vector",
            Value::TimeVec(_) => "time vector",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Table(_) => "table",
        }
    }

    /// Element count for vector-shaped values; `None` for atoms.
    pub fn count(&self) -> Option<usize> {
        match self {
            Value::BoolVec(v) => Some(v.len()),
            Value::ByteVec(v) => Some(v.len()),
            Value::ShortVec(v) => Some(v.len()),
            Value::IntVec(v) => Some(v.len()),
            Value::LongVec(v) => Some(v.len()),
            Value::RealVec(v) => Some(v.len()),
            Value::FloatVec(v) => Some(v.len()),
            Value::CharVec(v) => Some(v.len()),
            Value::SymbolVec(v) => Some(v.len()),
            Value::TimestampVec(v) => Some(v.len()),
            Value::MonthVec(v) => Some(v.len()),
            Value::DateVec(v) => Some(v.len()),
            Value::DateTimeVec(v) => Some(v.len()),
            Value::TimespanVec(v) => Some(v.len()),
            Value::MinuteVec(v) => Some(v.len()),
            Value::SecondVec(v) => Some(v.len()),
            Value::TimeVec(v) => Some(v.len()),
            Value::List(v) => Some(v.len()),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Dict ------------------------------------------------------------------

/// Ordered key-vector / value-vector pair. Keys and values may be any vector
/// shape; the engine uses the same frame for key/value maps and composite
/// multi-result payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict {
    pub keys: Value,
    pub values: Value,
}

impl Dict {
    pub fn new(keys: Value, values: Value) -> Self {
        Self { keys, values }
    }
}

// -----------------------------------------------------------------------------
// ----- Table -----------------------------------------------------------------

/// Column-oriented relation: ordered column names plus one equal-length
/// column vector per name.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    data: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("table has {names} column names but {columns} column vectors")]
    ColumnCountMismatch { names: usize, columns: usize },

    #[error("column `{column}` has length {len}, expected {expected}")]
    RaggedColumn {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("column `{column}` is not a vector")]
    NonVectorColumn { column: String },
}

impl Table {
    /// Builds a table, enforcing that every column is a vector and that all
    /// columns share one length.
    pub fn new(columns: Vec<String>, data: Vec<Value>) -> Result<Self, TableError> {
        if columns.len() != data.len() {
            return Err(TableError::ColumnCountMismatch {
                names: columns.len(),
                columns: data.len(),
            });
        }

        let mut expected = None;
        for (name, col) in columns.iter().zip(&data) {
            let len = col.count().ok_or_else(|| TableError::NonVectorColumn {
                column: name.clone(),
            })?;
            match expected {
                None => expected = Some(len),
                Some(e) if e != len => {
                    return Err(TableError::RaggedColumn {
                        column: name.clone(),
                        len,
                        expected: e,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(Self { columns, data })
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn columns(&self) -> &[Value] {
        &self.data
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.data.get(idx)
    }

    pub fn row_count(&self) -> usize {
        self.data.first().and_then(Value::count).unwrap_or(0)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table[{} cols x {} rows]", self.columns.len(), self.row_count())
    }
}

// -----------------------------------------------------------------------------
// ----- FromValue -------------------------------------------------------------

/// Conversion out of a decoded [`Value`], used by `execute_scalar` and
/// `receive`. Mismatched kinds surface as a conversion error rather than a
/// coercion; null sentinels pass through bit-exact.
pub trait FromValue: Sized {
    const EXPECTED: &'static str;

    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! from_value_atom {
    ($ty:ty, $expected:literal, $($variant:ident),+) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: Value) -> Result<Self, Value> {
                match value {
                    $(Value::$variant(v) => Ok(v),)+
                    other => Err(other),
                }
            }
        }
    };
}

from_value_atom!(bool, "bool", Bool);
from_value_atom!(u8, "byte", Byte);
from_value_atom!(i16, "short", Short);
from_value_atom!(i32, "int", Int);
from_value_atom!(i64, "long", Long);
from_value_atom!(f32, "real", Real);
from_value_atom!(f64, "float", Float);
from_value_atom!(char, "char", Char);
from_value_atom!(Vec<i32>, "int vector", IntVec);
from_value_atom!(Vec<i64>, "long vector", LongVec);
from_value_atom!(Vec<f64>, "float vector", FloatVec);

impl FromValue for String {
    const EXPECTED: &'static str = "symbol or char vector";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Symbol(s) | Value::CharVec(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any value";

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

impl FromValue for Table {
    const EXPECTED: &'static str = "table";

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Table(t) => Ok(*t),
            other => Err(other),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------
