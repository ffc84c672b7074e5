//! Streaming shapes of RPC methods.

/// Streaming shape of an RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcShape {
    /// Single request, single response.
    Unary,

    /// Stream of requests, single response.
    ClientStreaming,

    /// Single request, stream of responses.
    ServerStreaming,

    /// Streams in both directions.
    Bidirectional,
}

impl RpcShape {
    /// Shape of a method with the given streaming flags.
    #[must_use]
    pub fn classify(client_streaming: bool, server_streaming: bool) -> Self {
        match (client_streaming, server_streaming) {
            (false, false) => RpcShape::Unary,
            (true, false) => RpcShape::ClientStreaming,
            (false, true) => RpcShape::ServerStreaming,
            (true, true) => RpcShape::Bidirectional,
        }
    }

    /// The client sends a stream.
    #[must_use]
    pub fn is_client_streaming(self) -> bool {
        matches!(self, RpcShape::ClientStreaming | RpcShape::Bidirectional)
    }

    /// The server sends a stream.
    #[must_use]
    pub fn is_server_streaming(self) -> bool {
        matches!(self, RpcShape::ServerStreaming | RpcShape::Bidirectional)
    }

    /// Any streaming direction, i.e. the method needs stream handles.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        self != RpcShape::Unary
    }
}
