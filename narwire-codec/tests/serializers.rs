//! Round trips and wire shapes of the JSON and msgpack codecs

use std::collections::BTreeMap;

use narwire_codec::time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use narwire_codec::{
    BUILTINS, Codec, CodecError, Decoder, DecoderTable, Encoder, EncoderTable, ExceptionRegistry,
    Extension, Format, Generator, PagedResult, RemoteException, TimeDelta, Uuid, Value,
    json_dumps, json_loads, msgpack_dumps, msgpack_loads,
};
use rstest::rstest;
use serde_json::json;

fn datetime(offset_minutes: i32) -> OffsetDateTime {
    PrimitiveDateTime::new(
        Date::from_calendar_date(2015, Month::March, 4).unwrap(),
        Time::from_hms_micro(18, 25, 13, 1234).unwrap(),
    )
    .assume_offset(UtcOffset::from_whole_seconds(offset_minutes * 60).unwrap())
}

fn naive() -> PrimitiveDateTime {
    PrimitiveDateTime::new(
        Date::from_calendar_date(2015, Month::January, 1).unwrap(),
        Time::from_hms_micro(12, 4, 42, 231455).unwrap(),
    )
}

fn arrow() -> OffsetDateTime {
    PrimitiveDateTime::new(
        Date::from_calendar_date(2018, Month::April, 25).unwrap(),
        Time::from_hms_micro(16, 17, 53, 533672).unwrap(),
    )
    .assume_utc()
}

fn uuid() -> Uuid {
    Uuid::parse_str("cdd8f804-9db6-40c3-93ab-5955d3836234").unwrap()
}

fn data() -> Value {
    Value::map([
        ("bytes", Value::bytes(b"123456789\x99\xaf\xff\x00\x12".to_vec())),
        ("datetime_tz", Value::DateTime(datetime(118))),
        ("datetime_utc", Value::DateTime(datetime(0))),
        ("datetime_delta", Value::TimeDelta(TimeDelta::from_days(64).unwrap())),
        ("arrow_date", Value::Timestamp(arrow())),
        ("swhtype", Value::from("fake")),
        (
            "swh_dict",
            Value::map([("swhtype", Value::from(42)), ("d", Value::from("test"))]),
        ),
        ("random_dict", Value::map([("swhtype", Value::from(43))])),
        ("uuid", Value::Uuid(uuid())),
    ])
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_round_trip(#[case] format: Format) {
    let codec = Codec::new();
    let encoded = codec.encode(&data(), format).unwrap();
    assert_eq!(codec.decode(&encoded, format).unwrap(), data());
}

#[test]
fn test_encode_json_shape() {
    let text = json_dumps(&data(), []).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        raw,
        json!({
            "bytes": {"swhtype": "bytes", "d": "F)}kWH8wXmIhn8j01^"},
            "datetime_tz": {"swhtype": "datetime", "d": "2015-03-04T18:25:13.001234+01:58"},
            "datetime_utc": {"swhtype": "datetime", "d": "2015-03-04T18:25:13.001234+00:00"},
            "datetime_delta": {
                "swhtype": "timedelta",
                "d": {"days": 64, "seconds": 0, "microseconds": 0}
            },
            "arrow_date": {"swhtype": "arrow", "d": "2018-04-25T16:17:53.533672+00:00"},
            "swhtype": "fake",
            "swh_dict": {"swhtype": 42, "d": "test"},
            "random_dict": {"swhtype": 43},
            "uuid": {"swhtype": "uuid", "d": "cdd8f804-9db6-40c3-93ab-5955d3836234"},
        })
    );
}

#[test]
fn test_decode_json_wire_form() {
    let text = json!({
        "bytes": {"swhtype": "bytes", "d": "F)}kWH8wXmIhn8j01^"},
        "datetime_tz": {"swhtype": "datetime", "d": "2015-03-04T18:25:13.001234+01:58"},
        "datetime_utc": {"swhtype": "datetime", "d": "2015-03-04T18:25:13.001234+00:00"},
        "datetime_delta": {
            "swhtype": "timedelta",
            "d": {"days": 64, "seconds": 0, "microseconds": 0}
        },
        "arrow_date": {"swhtype": "arrow", "d": "2018-04-25T16:17:53.533672+00:00"},
        "swhtype": "fake",
        "swh_dict": {"swhtype": 42, "d": "test"},
        "random_dict": {"swhtype": 43},
        "uuid": {"swhtype": "uuid", "d": "cdd8f804-9db6-40c3-93ab-5955d3836234"},
    })
    .to_string();
    assert_eq!(json_loads(&text, []).unwrap(), data());
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_naive_datetime_is_refused(#[case] format: Format) {
    let value = Value::map([("datetime_naive", Value::NaiveDateTime(naive()))]);
    let err = Codec::new().encode(&value, format).unwrap_err();
    assert!(matches!(err, CodecError::NaiveDateTime(_)), "{err}");
    assert_eq!(err.to_string(), "2015-01-01 12:04:42.231455 is a naive datetime.");
}

#[test]
fn test_naive_datetime_decodes() {
    let text = r#"{"swhtype":"datetime","d":"2015-01-01T12:04:42.231455"}"#;
    assert_eq!(json_loads(text, []).unwrap(), Value::NaiveDateTime(naive()));
}

#[derive(Debug, PartialEq)]
struct ExtraType {
    arg1: Value,
    arg2: Value,
}

fn extra_encoders() -> Vec<Encoder> {
    vec![Encoder::extension::<ExtraType, _>("extratype", |o| {
        Ok(Value::List(vec![o.arg1.clone(), o.arg2.clone()]))
    })]
}

fn extra_decoders() -> Vec<Decoder> {
    vec![Decoder::new("extratype", |payload| match payload {
        Value::List(mut args) if args.len() == 2 => {
            let arg2 = args.pop().unwrap_or(Value::Null);
            let arg1 = args.pop().unwrap_or(Value::Null);
            Ok(Value::Extension(Extension::new(ExtraType { arg1, arg2 })))
        }
        other => Err(CodecError::InvalidPayload {
            tag: "extratype".into(),
            reason: format!("expected two arguments, got {other}"),
        }),
    })]
}

fn extra_data() -> Value {
    Value::List(vec![
        Value::Extension(Extension::new(ExtraType {
            arg1: Value::from("baz"),
            arg2: data(),
        })),
        Value::from("qux"),
    ])
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_round_trip_extra_types(#[case] format: Format) {
    let codec = Codec::with_extra(extra_encoders(), extra_decoders());
    let encoded = codec.encode(&extra_data(), format).unwrap();
    assert_eq!(codec.decode(&encoded, format).unwrap(), extra_data());

    let encoded = narwire_codec::encode(&extra_data(), format, extra_encoders()).unwrap();
    assert_eq!(
        narwire_codec::decode(&encoded, format, extra_decoders()).unwrap(),
        extra_data()
    );
}

#[test]
fn test_extra_encoders_leave_builtin_alone() {
    let _ = Codec::with_extra(extra_encoders(), extra_decoders());
    let err = json_dumps(&extra_data(), []).unwrap_err();
    assert!(matches!(err, CodecError::Unserializable(_)), "{err}");
    assert_eq!(Codec::new().encoders().len(), EncoderTable::builtin().len());
}

#[test]
fn test_unknown_tag_without_extra_decoder() {
    let text = json_dumps(&extra_data(), extra_encoders()).unwrap();
    let Value::List(items) = json_loads(&text, []).unwrap() else {
        panic!("expected a list");
    };
    let envelope = items[0].as_map().unwrap();
    assert_eq!(envelope.get("swhtype"), Some(&Value::from("extratype")));
}

#[test]
fn test_builtin_decoder_wins_over_extra() {
    let text = json_dumps(&Value::Uuid(uuid()), []).unwrap();
    let shadow = Decoder::new("uuid", |_| Ok(Value::Null));
    assert_eq!(json_loads(&text, [shadow]).unwrap(), Value::Uuid(uuid()));
}

#[test]
fn test_separate_decoder_table() {
    let mut decoders = DecoderTable::empty();
    decoders.insert(Decoder::new("uuid", |_| Ok(Value::from("replaced"))));
    let codec = Codec::from_tables(EncoderTable::builtin(), decoders);
    let encoded = codec.encode(&Value::Uuid(uuid()), Format::Msgpack).unwrap();
    assert_eq!(
        codec.decode(&encoded, Format::Msgpack).unwrap(),
        Value::from("replaced")
    );
}

fn generator() -> Value {
    Value::Generator(Generator::new(|| (0..5).map(Value::from)))
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_generator(#[case] format: Format) {
    let codec = Codec::new();
    let encoded = codec.encode(&generator(), format).unwrap();
    let expected: Vec<Value> = (0..5).map(Value::from).collect();
    assert_eq!(codec.decode(&encoded, format).unwrap(), Value::List(expected));
}

#[derive(Debug, PartialEq)]
struct Triple(i64, i64, i64);

fn triple() -> Value {
    Value::Extension(Extension::iterable(Triple(1, 2, 3), |t| {
        vec![Value::from(t.0), Value::from(t.1), Value::from(t.2)]
    }))
}

#[test]
fn test_json_iterable_fallback() {
    assert_eq!(json_dumps(&triple(), []).unwrap(), "[1,2,3]");
}

#[test]
fn test_msgpack_has_no_iterable_fallback() {
    let err = msgpack_dumps(&triple(), []).unwrap_err();
    assert!(matches!(err, CodecError::Unserializable(_)), "{err}");
}

#[test]
fn test_opaque_extension_is_unserializable() {
    let value = Value::Extension(Extension::new(Triple(1, 2, 3)));
    let err = json_dumps(&value, []).unwrap_err();
    assert!(matches!(err, CodecError::Unserializable(name) if name.ends_with("Triple")));
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_paged_result(#[case] format: Format) {
    let page = Value::from(PagedResult::new(
        vec![Value::Uuid(uuid()), Value::bytes(b"raw".to_vec())],
        Some(Value::from("next")),
    ));
    let last = Value::from(PagedResult::new(vec![], None));
    let codec = Codec::new();
    for value in [page, last] {
        let encoded = codec.encode(&value, format).unwrap();
        assert_eq!(codec.decode(&encoded, format).unwrap(), value);
    }
}

#[rstest]
#[case::json(Format::Json)]
#[case::msgpack(Format::Msgpack)]
fn test_exception_round_trip(#[case] format: Format) {
    let exc = RemoteException::new(BUILTINS, "ValueError", vec![Value::from("boom"), Value::from(2)]);
    let value = Value::from(exc.clone().with_traceback(vec!["Traceback".into()]));
    let codec = Codec::new();
    let encoded = codec.encode(&value, format).unwrap();
    // The traceback stays on the sending side
    assert_eq!(codec.decode(&encoded, format).unwrap(), Value::from(exc));
}

#[test]
fn test_exception_wire_shape() {
    let exc = RemoteException::new(BUILTINS, "KeyError", vec![Value::from("k")])
        .with_traceback(vec!["line 1\n".into()]);
    let raw: serde_json::Value =
        serde_json::from_str(&json_dumps(&Value::from(exc), []).unwrap()).unwrap();
    assert_eq!(
        raw,
        json!({"swhtype": "exception", "d": {
            "type": "KeyError",
            "module": "builtins",
            "args": ["k"],
            "message": "k",
            "traceback": ["line 1\n"],
        }})
    );
}

#[test]
fn test_unregistered_exception() {
    let exc = RemoteException::new("os", "system", vec![]);
    let text = json_dumps(&Value::from(exc.clone()), []).unwrap();
    let err = json_loads(&text, []).unwrap_err();
    assert!(matches!(err, CodecError::UnknownException { .. }), "{err}");

    let mut registry = ExceptionRegistry::empty();
    registry.register_class("os", "system");
    let codec = Codec::from_tables(
        EncoderTable::builtin(),
        DecoderTable::builtin_with_exceptions(registry),
    );
    assert_eq!(codec.json_loads(&text).unwrap(), Value::from(exc));
}

#[test]
fn test_big_ints_both_formats() {
    let big = narwire_codec::BigInt::from(10).pow(40);
    let value = Value::map([
        ("pos", Value::Int(big.clone())),
        ("neg", Value::Int(-big)),
        ("small", Value::from(-1)),
    ]);
    for format in [Format::Json, Format::Msgpack] {
        let codec = Codec::new();
        let encoded = codec.encode(&value, format).unwrap();
        assert_eq!(codec.decode(&encoded, format).unwrap(), value);
    }
}

#[test]
fn test_msgpack_loads_plain_map() {
    let mut expected = BTreeMap::new();
    expected.insert("a".to_owned(), Value::from(1));
    let packed = msgpack_dumps(&Value::Map(expected.clone()), []).unwrap();
    assert_eq!(msgpack_loads(&packed, []).unwrap(), Value::Map(expected));
}
