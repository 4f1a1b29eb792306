/* Copyright 2023- The Binedge, Lda team. All rights reserved.
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *     http://www.apache.org/licenses/LICENSE-2.0
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The `server_message_data` wire record (§6) and the recursive tree walk
//! that finds it anywhere in a packet subtree (§3, §9 "Varint and
//! length-delimited framing"). This is a hand-rolled minimal varint +
//! wire-type-2 codec for exactly one 2-field message, on purpose: the
//! spec's design notes call for this instead of pulling in a full
//! protobuf/schema runtime for a single record.

use serde_json::{Map, Value};

/// The decoded shape of a `server_message_data` record. Either field may be
/// absent (§6); unknown fields are skipped on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessageData {
    /// Field 1: a UUID string.
    pub uuid: Option<String>,
    /// Field 3, sub-field 1: seconds.
    pub seconds: Option<u64>,
    /// Field 3, sub-field 2: nanos.
    pub nanos: Option<u64>,
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*pos)?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

fn write_tag(buf: &mut Vec<u8>, field: u64, wire_type: u64) {
    write_varint(buf, (field << 3) | wire_type);
}

fn write_length_delimited(buf: &mut Vec<u8>, field: u64, payload: &[u8]) {
    write_tag(buf, field, 2);
    write_varint(buf, payload.len() as u64);
    buf.extend_from_slice(payload);
}

fn skip_field(buf: &[u8], pos: &mut usize, wire_type: u64) -> Option<()> {
    match wire_type {
        0 => {
            read_varint(buf, pos)?;
        }
        1 => *pos += 8,
        2 => {
            let len = read_varint(buf, pos)? as usize;
            *pos += len;
        }
        5 => *pos += 4,
        _ => return None,
    }
    Some(())
}

impl ServerMessageData {
    /// Encode this record into its wire bytes: field 1 is the UUID string
    /// (length-delimited), field 3 is a nested timestamp message whose own
    /// field 1/2 are the seconds/nanos varints (§6).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(uuid) = &self.uuid {
            write_length_delimited(&mut buf, 1, uuid.as_bytes());
        }
        if self.seconds.is_some() || self.nanos.is_some() {
            let mut ts = Vec::new();
            if let Some(seconds) = self.seconds {
                write_tag(&mut ts, 1, 0);
                write_varint(&mut ts, seconds);
            }
            if let Some(nanos) = self.nanos {
                write_tag(&mut ts, 2, 0);
                write_varint(&mut ts, nanos);
            }
            write_length_delimited(&mut buf, 3, &ts);
        }
        buf
    }

    /// Decode the inverse of [`ServerMessageData::encode`]. Unknown fields
    /// (and unknown wire types within them) are skipped, not fatal.
    pub fn decode(bytes: &[u8]) -> ServerMessageData {
        let mut record = ServerMessageData::default();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let Some(tag) = read_varint(bytes, &mut pos) else {
                break;
            };
            let field = tag >> 3;
            let wire_type = tag & 0x7;
            match (field, wire_type) {
                (1, 2) => {
                    let Some(len) = read_varint(bytes, &mut pos) else {
                        break;
                    };
                    let len = len as usize;
                    if pos + len > bytes.len() {
                        break;
                    }
                    if let Ok(s) = std::str::from_utf8(&bytes[pos..pos + len]) {
                        record.uuid = Some(s.to_string());
                    }
                    pos += len;
                }
                (3, 2) => {
                    let Some(len) = read_varint(bytes, &mut pos) else {
                        break;
                    };
                    let len = len as usize;
                    if pos + len > bytes.len() {
                        break;
                    }
                    let sub = &bytes[pos..pos + len];
                    let mut sub_pos = 0usize;
                    while sub_pos < sub.len() {
                        let Some(sub_tag) = read_varint(sub, &mut sub_pos) else {
                            break;
                        };
                        let sub_field = sub_tag >> 3;
                        let sub_wire = sub_tag & 0x7;
                        match (sub_field, sub_wire) {
                            (1, 0) => record.seconds = read_varint(sub, &mut sub_pos),
                            (2, 0) => record.nanos = read_varint(sub, &mut sub_pos),
                            _ => {
                                if skip_field(sub, &mut sub_pos, sub_wire).is_none() {
                                    break;
                                }
                            }
                        }
                    }
                    pos += len;
                }
                _ => {
                    if skip_field(bytes, &mut pos, wire_type).is_none() {
                        break;
                    }
                }
            }
        }
        record
    }

    /// Serialize to the base64url-unpadded string this gateway puts on the
    /// wire in place of the JSON object (§6).
    pub fn to_wire_string(&self) -> String {
        data_encoding::BASE64URL_NOPAD.encode(&self.encode())
    }

    /// Parse the inverse of [`ServerMessageData::to_wire_string`].
    pub fn from_wire_string(s: &str) -> Option<ServerMessageData> {
        let bytes = data_encoding::BASE64URL_NOPAD.decode(s.as_bytes()).ok()?;
        Some(ServerMessageData::decode(&bytes))
    }

    fn from_json(value: &Value) -> Option<ServerMessageData> {
        let obj = value.as_object()?;
        Some(ServerMessageData {
            uuid: obj.get("uuid").and_then(Value::as_str).map(String::from),
            seconds: obj.get("seconds").and_then(Value::as_u64),
            nanos: obj.get("nanos").and_then(Value::as_u64),
        })
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(uuid) = &self.uuid {
            map.insert("uuid".to_string(), Value::String(uuid.clone()));
        }
        if let Some(seconds) = self.seconds {
            map.insert("seconds".to_string(), Value::from(seconds));
        }
        if let Some(nanos) = self.nanos {
            map.insert("nanos".to_string(), Value::from(nanos));
        }
        Value::Object(map)
    }
}

/// Walk `value` and replace every `server_message_data`/`serverMessageData`
/// object anywhere in the tree with its base64url wire-form string (§4.3,
/// §9). Any key literally named either form is rewritten, regardless of
/// depth or position, since the upstream's packets place this key at varying
/// locations, so a fixed path is not sufficient.
pub fn encode_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                if key == "server_message_data" || key == "serverMessageData" {
                    if let Some(child) = map.get(&key) {
                        if let Some(record) = ServerMessageData::from_json(child) {
                            map.insert(key, Value::String(record.to_wire_string()));
                            continue;
                        }
                    }
                }
                if let Some(child) = map.get_mut(&key) {
                    encode_in_place(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                encode_in_place(item);
            }
        }
        _ => {}
    }
}

/// The inverse walk: expand every `server_message_data`/`serverMessageData`
/// wire string anywhere in the tree back into its record object (§3).
pub fn decode_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let keys: Vec<String> = map.keys().cloned().collect();
            for key in keys {
                if key == "server_message_data" || key == "serverMessageData" {
                    if let Some(Value::String(s)) = map.get(&key) {
                        if let Some(record) = ServerMessageData::from_wire_string(s) {
                            map.insert(key, record.to_json());
                            continue;
                        }
                    }
                }
                if let Some(child) = map.get_mut(&key) {
                    decode_in_place(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                decode_in_place(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_full_record() {
        let record = ServerMessageData {
            uuid: Some("abc-123".to_string()),
            seconds: Some(1_700_000_000),
            nanos: Some(123),
        };
        let decoded = ServerMessageData::decode(&record.encode());
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trips_wire_string() {
        let record = ServerMessageData {
            uuid: Some("u".to_string()),
            seconds: None,
            nanos: Some(7),
        };
        let wire = record.to_wire_string();
        assert!(!wire.contains('='), "nopad base64url must carry no padding");
        let decoded = ServerMessageData::from_wire_string(&wire).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let record = ServerMessageData::default();
        let decoded = ServerMessageData::decode(&record.encode());
        assert_eq!(decoded, ServerMessageData::default());
    }

    #[test]
    fn encode_in_place_rewrites_nested_snake_case_key() {
        let mut value = json!({
            "task_context": {
                "tasks": [{
                    "server_message_data": {"uuid": "x", "seconds": 1, "nanos": 2}
                }]
            }
        });
        encode_in_place(&mut value);
        let wire = value["task_context"]["tasks"][0]["server_message_data"]
            .as_str()
            .expect("should become a string");
        let decoded = ServerMessageData::from_wire_string(wire).unwrap();
        assert_eq!(decoded.uuid.as_deref(), Some("x"));
    }

    #[test]
    fn encode_then_decode_in_place_round_trips_camel_case_key() {
        let mut value = json!({
            "serverMessageData": {"uuid": "y", "seconds": 5}
        });
        encode_in_place(&mut value);
        assert!(value["serverMessageData"].is_string());
        decode_in_place(&mut value);
        assert_eq!(value["serverMessageData"]["uuid"], "y");
        assert_eq!(value["serverMessageData"]["seconds"], 5);
    }
}
