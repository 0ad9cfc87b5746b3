// self
use crate::obs::{FlowOutcome, GrantKind, RevocationReason};

/// Records a grant outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: GrantKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"middlecat_broker_grant_total",
			"grant" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts a broker-initiated revocation via the global metrics recorder (when enabled).
pub fn count_revocation(reason: RevocationReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("middlecat_broker_revocation_total", "reason" => reason.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = reason;
	}
}
