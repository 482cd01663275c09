//! Relay rejection for an unknown destination
//!
//! The relay knows only the station behind it and has no default route,
//! so a request for any other station has nowhere to go. The originator
//! gets a typed failure, produced by the relay, back over the arrival link.

use crate::framework::{id, Check, Overlay, TestScenario, CSMS, RELAY, STATION};
use anyhow::Result;
use async_trait::async_trait;
use ocpp_codec::messages::{ResetRequest, ResetType};
use ocpp_codec::{ErrorCode, OcppResponse, SourceRouting};
use relay_core::ForwardingConfig;
use tokio_util::sync::CancellationToken;

pub struct UnknownDestinationTest {
    pub destination: String,
}

impl Default for UnknownDestinationTest {
    fn default() -> Self {
        Self {
            destination: "cs-404".to_string(),
        }
    }
}

#[async_trait]
impl TestScenario for UnknownDestinationTest {
    fn name(&self) -> &str {
        "unknown_destination"
    }

    fn description(&self) -> &str {
        "Relay answers a request for an unroutable station with a GenericError failure"
    }

    fn topology(&self) -> Result<Overlay> {
        let mut overlay = Overlay::new();
        overlay.add(CSMS, |b| Ok(b.default_route(id(RELAY)?)))?;
        overlay.add(RELAY, |b| {
            Ok(b.forwarding(ForwardingConfig::default())
                .route(id(STATION)?, id(STATION)?))
        })?;
        overlay.add(STATION, |b| Ok(b.default_route(id(RELAY)?)))?;
        overlay.link(CSMS, RELAY)?;
        overlay.link(RELAY, STATION)?;
        Ok(overlay)
    }

    async fn execute(&self, overlay: &Overlay) -> Result<Vec<Check>> {
        let csms = overlay.node(CSMS)?;
        let request = ResetRequest::new(
            SourceRouting::to(id(&self.destination)?),
            ResetType::Immediate,
            None,
            csms.request_options(),
        );
        let response = csms.send(request, &CancellationToken::new()).await?;
        let description = response.result().description().unwrap_or_default().to_string();
        let rejected = overlay
            .node(RELAY)?
            .forwarding()
            .map(|engine| engine.stats().rejected)
            .unwrap_or_default();

        Ok(vec![
            Check::that("response failed", !response.result().is_ok(), response.result().to_string()),
            Check::equal("error code", response.result().error_code(), Some(ErrorCode::GenericError)),
            Check::that(
                "names the destination",
                description.contains(&self.destination),
                description.clone(),
            ),
            Check::equal("relay rejections", rejected, 1),
        ])
    }
}
