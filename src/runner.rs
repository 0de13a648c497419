use crate::{
    checks::{Checks, ResponseInfo},
    config::Config,
    metrics::RequestSample,
    pacing::Pacing,
};
use chrono::Utc;
use colored::Colorize;
use futures_util::future::join_all;
use reqwest::Client;
use std::{sync::Arc, time::Instant};
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SCHEDULER_TICK: Duration = Duration::from_millis(250);

/// Read-only state shared by every virtual user for the lifetime of a run.
struct IterationContext {
    client: Client,
    mode: String,
    pacing: Pacing,
    requests: Vec<RequestSpec>,
}

struct RequestSpec {
    scenario: String,
    url: String,
    checks: Checks,
}

impl IterationContext {
    fn new(config: &Config, client: Client) -> anyhow::Result<IterationContext> {
        let requests = config
            .scenarios
            .iter()
            .map(|scenario| {
                Ok(RequestSpec {
                    scenario: scenario.name.clone(),
                    url: config.url_for(scenario),
                    checks: scenario.checks()?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(IterationContext {
            client,
            mode: config.target.mode.to_string(),
            pacing: config.pacing()?,
            requests,
        })
    }
}

/// Drives the whole run: sizes the virtual-user pool towards the profile's
/// target once per tick, then ramps down and drains in-flight iterations
/// within the grace period. Returns once every virtual user has stopped.
///
/// # Arguments
///
/// * config - The validated run configuration.
/// * client - Shared HTTP client; reqwest clients pool connections internally.
/// * tx - Sample channel into the collector. Dropped before returning so the
///   collector can finish.
/// * cancel - Cancelling this token ends the run early (ctrl-c). Virtual
///   users stop between iterations, never mid-request.
pub async fn drive(
    config: &Config,
    client: &Client,
    tx: UnboundedSender<RequestSample>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let ctx = Arc::new(IterationContext::new(config, client.clone())?);
    let total = config.profile.total_duration();
    let started = Instant::now();

    println!(
        "> running load profile: {} stages, {}s scheduled, peak {} virtual users",
        config.profile.stages.len(),
        total.as_secs(),
        config.profile.peak_target().to_string().green(),
    );

    let mut active: Vec<(CancellationToken, JoinHandle<()>)> = vec![];
    let mut draining: Vec<JoinHandle<()>> = vec![];
    let mut spawned: u64 = 0;
    let mut last_target = 0;

    let mut ticker = tokio::time::interval(SCHEDULER_TICK);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("run interrupted, ramping down");
                break;
            }
            _ = ticker.tick() => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= total {
            break;
        }

        let desired = config.profile.target_at(elapsed) as usize;
        if desired != last_target {
            println!(
                "> t+{}s: ramping to {} virtual users",
                elapsed.as_secs(),
                desired.to_string().green()
            );
            last_target = desired;
        }

        active.retain(|(_, handle)| !handle.is_finished());
        draining.retain(|handle| !handle.is_finished());

        while active.len() < desired {
            let vu_token = cancel.child_token();
            let handle = tokio::spawn(virtual_user(
                spawned,
                Arc::clone(&ctx),
                tx.clone(),
                vu_token.clone(),
            ));
            active.push((vu_token, handle));
            spawned += 1;
        }
        // ramping down: most recently started users stop first, each
        // finishing its current iteration
        while active.len() > desired {
            if let Some((vu_token, handle)) = active.pop() {
                vu_token.cancel();
                draining.push(handle);
            }
        }
    }

    for (vu_token, handle) in active {
        vu_token.cancel();
        draining.push(handle);
    }

    info!(
        "profile complete after {}s, draining {} virtual users (grace {}s)",
        started.elapsed().as_secs(),
        draining.len(),
        config.profile.grace_period.as_secs()
    );

    let deadline = tokio::time::Instant::now() + config.profile.grace_period;
    for mut handle in draining {
        if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
            warn!("grace period elapsed with an iteration still in flight, aborting it");
            handle.abort();
        }
    }

    drop(tx);
    Ok(())
}

/// The body of one simulated user: loop the iteration until told to stop.
/// Cancellation takes effect between iterations or during think-time, so an
/// iteration that has started always sees its requests through.
async fn virtual_user(
    id: u64,
    ctx: Arc<IterationContext>,
    tx: UnboundedSender<RequestSample>,
    token: CancellationToken,
) {
    debug!("vu {id} starting");
    loop {
        if token.is_cancelled() {
            break;
        }

        run_iteration(&ctx, &tx).await;

        tokio::select! {
            _ = token.cancelled() => break,
            _ = ctx.pacing.pause() => {}
        }
    }
    debug!("vu {id} stopped");
}

/// One iteration: issue every scenario request as an explicit concurrent
/// batch and record a sample per response. A failed request degrades the
/// run's metrics but never aborts the iteration or the run.
async fn run_iteration(ctx: &IterationContext, tx: &UnboundedSender<RequestSample>) {
    let batch = ctx.requests.iter().map(|spec| issue_request(ctx, spec));
    for sample in join_all(batch).await {
        // send only fails when the collector is gone, i.e. the run is over
        tx.send(sample).ok();
    }
}

async fn issue_request(ctx: &IterationContext, spec: &RequestSpec) -> RequestSample {
    let timestamp_ms = Utc::now().timestamp_millis();
    let started = Instant::now();

    let response = match ctx.client.get(&spec.url).send().await {
        // read the body to completion so the measured duration covers the
        // full round trip
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.bytes().await {
                Ok(_) => Some(ResponseInfo {
                    status,
                    duration: started.elapsed(),
                }),
                Err(e) => {
                    debug!("body read failed for {}: {e}", spec.url);
                    None
                }
            }
        }
        Err(e) => {
            debug!("request failed for {}: {e}", spec.url);
            None
        }
    };

    let outcome = spec.checks.evaluate(response.as_ref());

    RequestSample {
        timestamp_ms,
        scenario: spec.scenario.clone(),
        mode: ctx.mode.clone(),
        status: response.map(|r| r.status),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        status_ok: outcome.status_ok,
        duration_ok: outcome.duration_ok,
        failed: match response {
            Some(r) => r.status >= 400,
            None => true,
        },
    }
}
