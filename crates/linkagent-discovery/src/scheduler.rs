//! Steady-state loop of a configured controller

use crate::controller::Controller;
use crate::fsm::Outcome;
use linkagent_core::ControllerState;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// First tick one period from now; late ticks are delayed, not bunched
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Emit probes, re-enumerate ports, re-validate the pipeline and prune
/// stale entries until the controller leaves `Configured` or is cancelled
pub async fn run(controller: &Controller) {
    let mut state_rx = controller.subscribe_state();
    if *state_rx.borrow_and_update() != ControllerState::Configured {
        return;
    }

    let config = controller.config();
    let mut emit = ticker(config.emit_period());
    let mut ports = ticker(config.port_rediscovery_period());
    let mut pipeline = ticker(config.pipeline_validation_period());
    let mut prune = ticker(config.prune_period());
    info!(
        emit_secs = config.emit_frequency,
        rediscovery_secs = config.port_rediscovery_frequency,
        validation_secs = config.pipeline_validation_frequency,
        prune_secs = config.link_prune_frequency,
        "Discovery running"
    );

    if controller.options().emit_on_configure {
        controller.emit_probes().await;
    }

    let cancel = controller.cancel_token().clone();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = state_rx.changed() => {
                let configured = *state_rx.borrow_and_update() == ControllerState::Configured;
                if changed.is_err() || !configured {
                    break;
                }
            }
            _ = emit.tick() => {
                controller.emit_probes().await;
            }
            _ = ports.tick() => {
                if !controller.rediscover_ports().await {
                    warn!("Port rediscovery failed; keeping previous ports");
                }
            }
            _ = pipeline.tick() => {
                let outcome = controller.validate_pipeline().await;
                if outcome != Outcome::Failure {
                    controller.transition(ControllerState::Configured, outcome);
                }
            }
            _ = prune.tick() => {
                let links = controller.prune_links().len();
                let hosts = controller.prune_hosts().len();
                if links + hosts > 0 {
                    debug!(links, hosts, "Prune pass");
                }
            }
        }

        if controller.state() != ControllerState::Configured {
            break;
        }
    }
    debug!("Discovery loop exited");
}
