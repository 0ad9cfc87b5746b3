//! Expiry sweep.

// self
use crate::{
	_prelude::*,
	flows::{Broker, common},
	obs::{self, GrantKind},
};

impl Broker {
	/// Deletes every session whose absolute or sliding expiry has passed. Returns the count.
	///
	/// There is no background scheduler; the endpoint adapter calls this before serving each
	/// token request.
	pub async fn sweep_expired(&self) -> Result<usize> {
		common::observe(GrantKind::Sweep, "sweep_expired", async move {
			let removed = self.store.delete_expired(self.now()).await?;

			obs::log_sweep(removed);

			Ok(removed)
		})
		.await
	}
}
