use crate::{
    errors::CodecError,
    packet::{RouteControlRequest, RouteUpdateRequest},
};

/// Turns CCP messages into the bytes carried in a Prepare's data field and
/// back. The routing core never looks inside the bytes.
pub trait CcpCodec: Send + Sync + 'static {
    fn encode_control(&self, request: &RouteControlRequest) -> Result<Vec<u8>, CodecError>;

    fn decode_control(&self, data: &[u8]) -> Result<RouteControlRequest, CodecError>;

    fn encode_update(&self, request: &RouteUpdateRequest) -> Result<Vec<u8>, CodecError>;

    fn decode_update(&self, data: &[u8]) -> Result<RouteUpdateRequest, CodecError>;
}

/// Encodes CCP messages as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCcpCodec;

impl CcpCodec for JsonCcpCodec {
    fn encode_control(&self, request: &RouteControlRequest) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(request).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode_control(&self, data: &[u8]) -> Result<RouteControlRequest, CodecError> {
        serde_json::from_slice(data).map_err(|err| CodecError::Decode(err.to_string()))
    }

    fn encode_update(&self, request: &RouteUpdateRequest) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(request).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode_update(&self, data: &[u8]) -> Result<RouteUpdateRequest, CodecError> {
        serde_json::from_slice(data).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;

    #[test]
    fn decodes_update_with_routes() {
        let codec = JsonCcpCodec;
        let encoded = codec.encode_update(&UPDATE_REQUEST_COMPLEX).unwrap();
        assert_eq!(codec.decode_update(&encoded).unwrap(), *UPDATE_REQUEST_COMPLEX);
    }

    #[test]
    fn control_request_wire_shape() {
        let encoded = JsonCcpCodec.encode_control(&CONTROL_REQUEST).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value["mode"], "sync");
        assert_eq!(
            value["last_known_routing_table_id"],
            "70d1a134-a0df-4f47-964f-6e19e2ab3790"
        );
        assert_eq!(value["last_known_epoch"], 32);
    }

    #[test]
    fn auth_is_hex_encoded() {
        let encoded = JsonCcpCodec.encode_update(&UPDATE_REQUEST_COMPLEX).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(
            value["new_routes"][0]["auth"],
            hex::encode(UPDATE_REQUEST_COMPLEX.new_routes[0].auth)
        );
    }

    #[test]
    fn rejects_malformed_messages() {
        let codec = JsonCcpCodec;
        assert!(matches!(
            codec.decode_control(b"not json"),
            Err(CodecError::Decode(_))
        ));
        // an invalid prefix inside an otherwise well-formed update
        let mut value = serde_json::to_value(&*UPDATE_REQUEST_SIMPLE).unwrap();
        value["withdrawn_routes"] = serde_json::json!(["not a prefix"]);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(codec.decode_update(&bytes).is_err());
        // auth of the wrong length
        let mut value = serde_json::to_value(&*UPDATE_REQUEST_COMPLEX).unwrap();
        value["new_routes"][0]["auth"] = serde_json::json!("abcd");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(codec.decode_update(&bytes).is_err());
    }
}
