// carp-telemetry/src/lib.rs
// ============================================================================
// Module: CARP Runtime Broker Library
// Description: Reference sources/sinks and composite dispatcher for CARP Runtime.
// Purpose: Resolve external payloads and dispatch disclosures.
// Dependencies: carp-core, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! CARP Runtime Broker provides ready-made source and sink implementations
//! plus a composite dispatcher that wires them together.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod broker;
pub mod payload;
pub mod sink;
pub mod source;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use broker::BrokerError;
pub use broker::CompositeBroker;
pub use broker::CompositeBrokerBuilder;
pub use payload::Payload;
pub use payload::PayloadBody;
pub use sink::CallbackSink;
pub use sink::ChannelSink;
pub use sink::DispatchMessage;
pub use sink::LogSink;
pub use sink::Sink;
pub use sink::SinkError;
pub use source::FileSource;
pub use source::HttpSource;
pub use source::InlineSource;
pub use source::Source;
pub use source::SourceError;
pub use source::SourcePayload;
