// self
use crate::{
	_prelude::*,
	auth::SessionId,
	obs::{GrantKind, RevocationReason},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by grant operations.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided grant kind + stage.
	pub fn new(kind: GrantKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("middlecat_broker.grant", grant = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `warn` event for a broker-initiated revocation (when enabled).
pub fn log_revocation(session_id: &SessionId, reason: RevocationReason) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(session_id = %session_id, reason = reason.as_str(), "Delegation session revoked.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (session_id, reason);
	}
}

/// Emits a `debug` event when a sweep removed at least one session (when enabled).
pub fn log_sweep(removed: usize) {
	#[cfg(feature = "tracing")]
	{
		if removed > 0 {
			tracing::debug!(removed, "Expired delegation sessions swept.");
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = removed;
	}
}
