//! `encoding.*`: base64, hex, json, yaml and xml conversions.
//!
//! Decoders that produce raw bytes return a string when the bytes are
//! valid UTF-8 and a byte sequence otherwise.

pub mod repair;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use yao_process::{handler, to_string, Exception, Handler, Process, Value};

/// Root element used when serialising a value to XML.
pub const XML_ROOT: &str = "root";

pub(crate) fn handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("base64.encode", handler(base64_encode)),
        ("base64.decode", handler(base64_decode)),
        ("hex.encode", handler(hex_encode)),
        ("hex.decode", handler(hex_decode)),
        ("json.encode", handler(json_encode)),
        ("json.decode", handler(json_decode)),
        ("json.parse", handler(json_parse)),
        ("json.repair", handler(json_repair)),
        ("yaml.encode", handler(yaml_encode)),
        ("yaml.decode", handler(yaml_decode)),
        ("xml.encode", handler(xml_encode)),
        ("xml.decode", handler(xml_decode)),
    ]
}

pub(crate) fn register() {
    yao_process::register_group("encoding", handlers());
}

/// Argument `i` as raw bytes: byte sequences as is, anything else through
/// its string form.
fn input_bytes(p: &Process, i: usize) -> Result<Vec<u8>, Exception> {
    match p.arg(i) {
        Some(Value::Bytes(data)) => Ok(data.clone()),
        Some(Value::Null) | None => Err(Exception::bad_request(format!(
            "{}: input is required",
            p.name
        ))),
        Some(other) => Ok(to_string(other).into_bytes()),
    }
}

fn input_text(p: &Process, i: usize) -> Result<String, Exception> {
    p.validate_arg_nums(i + 1)?;
    match p.arg(i) {
        Some(Value::Bytes(data)) => String::from_utf8(data.clone())
            .map_err(|e| Exception::bad_request(format!("{}: {}", p.name, e))),
        Some(other) => Ok(to_string(other)),
        None => Ok(String::new()),
    }
}

fn bytes_value(data: Vec<u8>) -> Value {
    match String::from_utf8(data) {
        Ok(text) => Value::from(text),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

fn bad_input(p: &Process, err: impl std::fmt::Display) -> Exception {
    Exception::bad_request(format!("{}: {}", p.name, err))
}

fn base64_encode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    Ok(Value::from(STANDARD.encode(input_bytes(p, 0)?)))
}

fn base64_decode(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let data = STANDARD
        .decode(text.trim())
        .map_err(|e| bad_input(p, e))?;
    Ok(bytes_value(data))
}

fn hex_encode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    Ok(Value::from(hex::encode(input_bytes(p, 0)?)))
}

fn hex_decode(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let data = hex::decode(text.trim()).map_err(|e| bad_input(p, e))?;
    Ok(bytes_value(data))
}

fn json_encode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let json = p.args[0].to_json();
    let text = if p.args_bool_or(1, false) {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Value::from).map_err(|e| Exception::internal(e.to_string()))
}

fn json_decode(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| bad_input(p, e))?;
    Ok(Value::from(json))
}

/// Strict parse first, repair on failure.
fn json_parse(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
        return Ok(Value::from(json));
    }
    let json = repair::parse(&text).map_err(|e| bad_input(p, e))?;
    Ok(Value::from(json))
}

fn json_repair(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let repaired = repair::repair(&text).map_err(|e| bad_input(p, e))?;
    Ok(Value::from(repaired))
}

fn yaml_encode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let text = serde_yaml::to_string(&p.args[0].to_json())
        .map_err(|e| Exception::internal(e.to_string()))?;
    Ok(Value::from(text))
}

fn yaml_decode(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let json: serde_json::Value = serde_yaml::from_str(&text).map_err(|e| bad_input(p, e))?;
    Ok(Value::from(json))
}

fn xml_encode(p: &mut Process) -> Result<Value, Exception> {
    p.validate_arg_nums(1)?;
    let root = p.args_string_or(1, XML_ROOT);
    let text = quick_xml::se::to_string_with_root(&root, &p.args[0].to_json())
        .map_err(|e| bad_input(p, e))?;
    Ok(Value::from(text))
}

/// Element text decodes as strings; attributes appear as `@name` keys.
fn xml_decode(p: &mut Process) -> Result<Value, Exception> {
    let text = input_text(p, 0)?;
    let json: serde_json::Value = quick_xml::de::from_str(&text).map_err(|e| bad_input(p, e))?;
    Ok(Value::from(collapse_text(json)))
}

/// Replace `{"$text": v}` and `{"$value": v}` nodes with `v`.
fn collapse_text(json: serde_json::Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match json {
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(key) = ["$text", "$value"].iter().find(|k| map.contains_key(**k)) {
                    if let Some(inner) = map.get(*key) {
                        return collapse_text(inner.clone());
                    }
                }
            }
            Json::Object(map.into_iter().map(|(k, v)| (k, collapse_text(v))).collect())
        }
        Json::Array(items) => Json::Array(items.into_iter().map(collapse_text).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yao_process::{args, Registry};

    fn run(name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let registry = Registry::new();
        registry.register_group("encoding", handlers());
        registry.process(name, args)?.exec()
    }

    #[test]
    fn base64_round_trip_for_text_and_bytes() {
        let encoded = run("encoding.base64.Encode", args!["hello"]).unwrap();
        assert_eq!(encoded, Value::from("aGVsbG8="));
        let decoded = run("encoding.base64.Decode", args!["aGVsbG8="]).unwrap();
        assert_eq!(decoded, Value::from("hello"));

        let encoded = run("encoding.base64.Encode", vec![Value::Bytes(vec![0xff, 0x00])]).unwrap();
        let decoded = run("encoding.base64.Decode", vec![encoded]).unwrap();
        assert_eq!(decoded, Value::Bytes(vec![0xff, 0x00]));
    }

    #[test]
    fn invalid_input_is_bad_request() {
        let err = run("encoding.base64.Decode", args!["***"]).unwrap_err();
        assert_eq!(err.code, 400);
        let err = run("encoding.hex.Decode", args!["zz"]).unwrap_err();
        assert_eq!(err.code, 400);
        let err = run("encoding.json.Decode", args!["{"]).unwrap_err();
        assert_eq!(err.code, 400);
        let err = run("encoding.hex.Encode", vec![]).unwrap_err();
        assert_eq!(err.code, 400);
    }

    #[test]
    fn hex_encodes_lowercase() {
        let encoded = run("encoding.hex.Encode", args!["Yao"]).unwrap();
        assert_eq!(encoded, Value::from("59616f"));
    }

    #[test]
    fn json_parse_falls_back_to_repair() {
        let value = run("encoding.json.Parse", args!["```json\n{name: 'yao', tags: [1, 2,]}\n```"])
            .unwrap();
        assert_eq!(value.get("name"), Some(&Value::from("yao")));
        assert_eq!(value.get("tags.1"), Some(&Value::Integer(2)));
    }

    #[test]
    fn yaml_decodes_to_value() {
        let value = run("encoding.yaml.Decode", args!["name: yao\ncount: 3\n"]).unwrap();
        assert_eq!(value.get("count"), Some(&Value::Integer(3)));

        let text = run("encoding.yaml.Encode", vec![value]).unwrap();
        assert!(text.as_str().unwrap().contains("name: yao"));
    }

    #[test]
    fn xml_uses_root_element() {
        let value = Value::from(serde_json::json!({"name": "yao"}));
        let text = run("encoding.xml.Encode", vec![value]).unwrap();
        assert_eq!(text, Value::from("<root><name>yao</name></root>"));

        let decoded = run("encoding.xml.Decode", vec![text]).unwrap();
        assert_eq!(decoded.get("name"), Some(&Value::from("yao")));
    }
}
