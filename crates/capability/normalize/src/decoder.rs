use domain::{UplinkMessage, is_encodable_key};
use serde_json::Value;
use std::collections::BTreeMap;

const DEVICE_ID_POINTER: &str = "/end_device_ids/device_id";
const DECODED_PAYLOAD_POINTER: &str = "/uplink_message/decoded_payload";

/// 解码错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing end_device_ids.device_id")]
    MissingDeviceId,
    #[error("device id {0:?} cannot be used as a tag")]
    InvalidDeviceId(String),
    #[error("missing uplink_message.decoded_payload")]
    MissingDecodedPayload,
}

/// 将 TTN v3 上行报文解码为 [`UplinkMessage`]。
///
/// 只保留 `decoded_payload` 中数值类型的顶层字段；字符串、布尔、null
/// 以及嵌套对象/数组一律忽略。
pub fn decode_uplink(payload: &[u8]) -> Result<UplinkMessage, DecodeError> {
    let document: Value = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::MalformedPayload(err.to_string()))?;

    let device_id = document
        .pointer(DEVICE_ID_POINTER)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingDeviceId)?;
    if !is_encodable_key(device_id) {
        return Err(DecodeError::InvalidDeviceId(device_id.to_string()));
    }

    let decoded = document
        .pointer(DECODED_PAYLOAD_POINTER)
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingDecodedPayload)?;

    let fields = decoded
        .iter()
        .filter_map(|(name, value)| match value {
            Value::Number(number) => number.as_f64().map(|v| (name.clone(), v)),
            _ => None,
        })
        .collect::<BTreeMap<_, _>>();

    Ok(UplinkMessage {
        device_id: device_id.to_string(),
        fields,
    })
}
