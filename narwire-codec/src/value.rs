// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use num_bigint::{BigInt, Sign};
use time::{OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::exception::RemoteException;
use crate::isoformat;

/// A value that can travel over the wire.
///
/// The first eight variants map onto native JSON and msgpack types (bytes
/// are native to msgpack only). Everything else is carried inside a
/// `{"swhtype": tag, "d": payload}` envelope produced by an encoder table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Timezone-aware point in time, tagged `arrow`.
    Timestamp(OffsetDateTime),
    /// Timezone-aware datetime, tagged `datetime`.
    DateTime(OffsetDateTime),
    /// Datetime without offset. Decoding can produce it but encoding
    /// refuses it.
    NaiveDateTime(PrimitiveDateTime),
    TimeDelta(TimeDelta),
    Uuid(Uuid),
    PagedResult(Box<PagedResult>),
    Exception(Box<RemoteException>),
    /// Lazy sequence, materialized into a list when encoded.
    Generator(Generator),
    /// Caller-defined value, only encodable through an extra encoder (or,
    /// in JSON, through its iteration fallback).
    Extension(Extension),
}

impl Value {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Name of the variant, or of the wrapped type for extensions.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Timestamp(_) => "timestamp",
            Value::DateTime(_) => "datetime",
            Value::NaiveDateTime(_) => "naive datetime",
            Value::TimeDelta(_) => "timedelta",
            Value::Uuid(_) => "uuid",
            Value::PagedResult(_) => "paged result",
            Value::Exception(_) => "exception",
            Value::Generator(_) => "generator",
            Value::Extension(ext) => ext.type_name(),
        }
    }

    /// Truthiness with the usual dynamic-language rules: null, false,
    /// zero and empty containers are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => i.sign() != Sign::NoSign,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int(BigInt::from(value))
            }
        })*
    };
}

from_int!(i32, i64, u32, u64, i128, u128);

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<TimeDelta> for Value {
    fn from(value: TimeDelta) -> Self {
        Value::TimeDelta(value)
    }
}

impl From<PagedResult> for Value {
    fn from(value: PagedResult) -> Self {
        Value::PagedResult(Box::new(value))
    }
}

impl From<RemoteException> for Value {
    fn from(value: RemoteException) -> Self {
        Value::Exception(Box::new(value))
    }
}

impl From<Generator> for Value {
    fn from(value: Generator) -> Self {
        Value::Generator(value)
    }
}

impl From<Extension> for Value {
    fn from(value: Extension) -> Self {
        Value::Extension(value)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Python-style `repr`, used for exception messages and diagnostics.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_nan() => f.write_str("nan"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write_quoted(f, s),
            Value::Bytes(b) => {
                f.write_str("b'")?;
                for &byte in b {
                    match byte {
                        b'\\' => f.write_str("\\\\")?,
                        b'\'' => f.write_str("\\'")?,
                        0x20..=0x7e => write!(f, "{}", char::from(byte))?,
                        _ => write!(f, "\\x{byte:02x}")?,
                    }
                }
                f.write_str("'")
            }
            Value::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {value}")?;
                }
                f.write_str("}")
            }
            Value::Timestamp(dt) => write!(f, "<Arrow [{}]>", isoformat::format_offset(dt)),
            Value::DateTime(dt) => f.write_str(&isoformat::format_offset(dt)),
            Value::NaiveDateTime(dt) => f.write_str(&isoformat::format_naive(dt, ' ')),
            Value::TimeDelta(delta) => write!(f, "{delta}"),
            Value::Uuid(uuid) => write!(f, "UUID('{uuid}')"),
            Value::PagedResult(page) => {
                f.write_str("PagedResult(results=[")?;
                write_seq(f, &page.results)?;
                match &page.next_page_token {
                    Some(token) => write!(f, "], next_page_token={token})"),
                    None => f.write_str("], next_page_token=None)"),
                }
            }
            Value::Exception(exc) => {
                write!(f, "{}(", exc.type_name)?;
                write_seq(f, &exc.args)?;
                f.write_str(")")
            }
            Value::Generator(_) => f.write_str("<generator>"),
            Value::Extension(ext) => write!(f, "{ext:?}"),
        }
    }
}

const MICROS_PER_SECOND: i128 = 1_000_000;
const MICROS_PER_DAY: i128 = 86_400 * MICROS_PER_SECOND;

/// Signed duration normalized to days, seconds and microseconds, with
/// `0 <= seconds < 86400` and `0 <= microseconds < 1_000_000`; only `days`
/// carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeDelta {
    days: i64,
    seconds: u32,
    microseconds: u32,
}

impl TimeDelta {
    pub const MAX_DAYS: i64 = 999_999_999;

    /// Returns `None` when the normalized day count is outside
    /// `±MAX_DAYS`.
    pub fn new(days: i64, seconds: i64, microseconds: i64) -> Option<Self> {
        Self::from_micros(
            i128::from(days) * MICROS_PER_DAY
                + i128::from(seconds) * MICROS_PER_SECOND
                + i128::from(microseconds),
        )
    }

    pub fn from_days(days: i64) -> Option<Self> {
        Self::new(days, 0, 0)
    }

    pub fn from_micros(total: i128) -> Option<Self> {
        let days = i64::try_from(total.div_euclid(MICROS_PER_DAY))
            .ok()
            .filter(|days| days.abs() <= Self::MAX_DAYS)?;
        let rest = total.rem_euclid(MICROS_PER_DAY);
        Some(TimeDelta {
            days,
            seconds: (rest / MICROS_PER_SECOND) as u32,
            microseconds: (rest % MICROS_PER_SECOND) as u32,
        })
    }

    pub fn from_duration(duration: time::Duration) -> Option<Self> {
        Self::from_micros(duration.whole_microseconds())
    }

    pub const fn days(&self) -> i64 {
        self.days
    }

    pub const fn seconds(&self) -> u32 {
        self.seconds
    }

    pub const fn microseconds(&self) -> u32 {
        self.microseconds
    }

    pub fn total_microseconds(&self) -> i128 {
        i128::from(self.days) * MICROS_PER_DAY
            + i128::from(self.seconds) * MICROS_PER_SECOND
            + i128::from(self.microseconds)
    }
}

impl From<TimeDelta> for time::Duration {
    fn from(delta: TimeDelta) -> Self {
        time::Duration::new(
            delta.days * 86_400 + i64::from(delta.seconds),
            (delta.microseconds * 1000) as i32,
        )
    }
}

/// Formats like Python: `1 day, 2:03:04.000005`, `-1 day, 23:59:59`.
impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days != 0 {
            let plural = if self.days.abs() == 1 { "" } else { "s" };
            write!(f, "{} day{plural}, ", self.days)?;
        }
        let (hours, rest) = (self.seconds / 3600, self.seconds % 3600);
        write!(f, "{hours}:{:02}:{:02}", rest / 60, rest % 60)?;
        if self.microseconds != 0 {
            write!(f, ".{:06}", self.microseconds)?;
        }
        Ok(())
    }
}

/// A page of results with the token for fetching the next one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PagedResult {
    pub results: Vec<Value>,
    /// `None` travels as null.
    pub next_page_token: Option<Value>,
}

impl PagedResult {
    pub fn new(results: Vec<Value>, next_page_token: Option<Value>) -> Self {
        PagedResult {
            results,
            next_page_token,
        }
    }
}

type Items = Arc<dyn Fn() -> Box<dyn Iterator<Item = Value>> + Send + Sync>;

/// Repeatable lazy sequence of values.
#[derive(Clone)]
pub struct Generator(Items);

impl Generator {
    pub fn new<F, I>(items: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        Generator(Arc::new(move || Box::new(items().into_iter())))
    }

    pub fn materialize(&self) -> Vec<Value> {
        (self.0)().collect()
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator(..)")
    }
}

/// Two generators are equal only if they are clones of each other.
impl PartialEq for Generator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type IterateFn = Arc<dyn Fn(&dyn Any) -> Vec<Value> + Send + Sync>;

fn eq_as<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    matches!(
        (a.downcast_ref::<T>(), b.downcast_ref::<T>()),
        (Some(a), Some(b)) if a == b
    )
}

fn debug_as<T: fmt::Debug + 'static>(value: &dyn Any, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(value) => value.fmt(f),
        None => f.write_str("<extension>"),
    }
}

/// Type-erased caller value.
#[derive(Clone)]
pub struct Extension {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    eq: fn(&dyn Any, &dyn Any) -> bool,
    debug: fn(&dyn Any, &mut fmt::Formatter<'_>) -> fmt::Result,
    iterate: Option<IterateFn>,
}

impl Extension {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
    {
        Extension {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            eq: eq_as::<T>,
            debug: debug_as::<T>,
            iterate: None,
        }
    }

    /// An extension that JSON can fall back to encoding as the list
    /// returned by `iterate` when no encoder claims it.
    pub fn iterable<T, F>(value: T, iterate: F) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
        F: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        let mut ext = Self::new(value);
        ext.iterate = Some(Arc::new(move |any: &dyn Any| {
            any.downcast_ref::<T>().map(&iterate).unwrap_or_default()
        }));
        ext
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn iterate(&self) -> Option<Vec<Value>> {
        self.iterate.as_ref().map(|iterate| iterate(&*self.value))
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.debug)(&*self.value, f)
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        (self.eq)(&*self.value, &*other.value)
    }
}
