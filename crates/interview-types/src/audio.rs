/// Audio data encoded as base64, as the agent puts it on the wire.
pub type Base64EncodedAudioBytes = String;
