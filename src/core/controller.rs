//! Acquisition state machine.
//!
//! The controller runs as a single task that owns the [`AcquisitionState`]. Callers
//! talk to it through a [`ControllerHandle`]: configuration changes go in as commands,
//! state comes out through a `watch` channel. At most one attempt (with its backoff
//! sleep) and one refresh timer exist at a time; replacing or dropping them cancels
//! the underlying timer and HTTP transfer.

use crate::config::WidgetConfig;
use crate::core::{chart, coordinates, sanitize};
use crate::domain::model::{
    AcquiredDocument, AcquisitionState, Coordinates, ForecastSeries, SourceSpec,
};
use crate::domain::ports::{ConfigStore, DocumentSource, ForecastSource};
use crate::utils::error::{MeteogramError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const FORECAST_FAILURE_MESSAGE: &str = "Unable to load forecast data.";

/// Delay before the attempt that follows failed attempt `attempt` (1-based).
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * attempt
}

enum Command {
    Reconfigure(Box<WidgetConfig>),
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    SourceChanged,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Forecast(Coordinates),
    Direct(String),
}

enum Acquired {
    Forecast(ForecastSeries),
    Document(String),
}

type AttemptFuture = Pin<Box<dyn Future<Output = Result<Acquired>> + Send>>;

struct PendingAttempt {
    generation: u64,
    attempt: u32,
    route: Route,
    future: AttemptFuture,
}

struct AttemptOutcome {
    generation: u64,
    result: Result<Acquired>,
}

/// Caller side of a running controller.
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AcquisitionState>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Delivers a configuration change. Source changes re-run the pipeline,
    /// theme-only changes re-theme the retained document without network activity.
    pub fn reconfigure(&self, config: WidgetConfig) {
        self.send(Command::Reconfigure(Box::new(config)));
    }

    /// Re-runs the full pipeline for the current source.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn state(&self) -> AcquisitionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.clone()
    }

    /// Waits for the next published state that is not `Loading`.
    ///
    /// Returns `None` once the controller has stopped.
    pub async fn next_settled(&mut self) -> Option<AcquisitionState> {
        loop {
            self.state.changed().await.ok()?;
            let state = self.state.borrow_and_update().clone();
            if state.is_settled() {
                return Some(state);
            }
        }
    }

    /// Stops the controller and waits until its timers and requests are released.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Acquisition task ended abnormally: {}", e);
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Acquisition controller already stopped; command dropped");
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct AcquisitionController<F, D, S> {
    forecast: Arc<F>,
    documents: Arc<D>,
    store: S,
    config: Option<WidgetConfig>,
    /// Last good document for the current source; the stale fallback.
    retained_svg: Option<String>,
    /// Series behind `retained_svg` when it was rendered locally.
    retained_series: Option<ForecastSeries>,
    state: watch::Sender<AcquisitionState>,
    generation: u64,
    pending: Option<PendingAttempt>,
    refresh: Option<Interval>,
}

impl<F, D, S> AcquisitionController<F, D, S>
where
    F: ForecastSource + 'static,
    D: DocumentSource + 'static,
    S: ConfigStore + 'static,
{
    /// Starts the controller on the current tokio runtime in the `Idle` state.
    pub fn spawn(forecast: F, documents: D, store: S) -> ControllerHandle {
        let (state_tx, state_rx) = watch::channel(AcquisitionState::Idle);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let controller = Self {
            forecast: Arc::new(forecast),
            documents: Arc::new(documents),
            store,
            config: None,
            retained_svg: None,
            retained_series: None,
            state: state_tx,
            generation: 0,
            pending: None,
            refresh: None,
        };

        let task = tokio::spawn(controller.run(command_rx));
        ControllerHandle {
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Acquisition controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Reconfigure(config)) => self.reconfigure(*config),
                    Some(Command::Refresh) => self.trigger(Trigger::Refresh),
                    Some(Command::Shutdown) | None => break,
                },
                outcome = next_outcome(&mut self.pending) => self.settle(outcome).await,
                _ = next_tick(&mut self.refresh) => {
                    tracing::info!("Auto-refresh triggered");
                    self.trigger(Trigger::Refresh);
                }
            }
        }

        self.cancel_pending();
        self.refresh = None;
        tracing::debug!("Acquisition controller stopped");
    }

    fn reconfigure(&mut self, config: WidgetConfig) {
        let previous = self.config.replace(config.clone());

        let (source_changed, refresh_changed, theme_changed) = match &previous {
            Some(prev) => (
                prev.source_spec() != config.source_spec(),
                refresh_key(prev) != refresh_key(&config),
                prev.theme != config.theme,
            ),
            None => (true, true, false),
        };

        if refresh_changed {
            self.schedule_refresh();
        }

        if source_changed {
            self.trigger(Trigger::SourceChanged);
        } else if theme_changed {
            self.apply_theme();
        }
    }

    fn schedule_refresh(&mut self) {
        self.refresh = self
            .config
            .as_ref()
            .and_then(WidgetConfig::refresh_period)
            .map(|period| {
                tracing::info!("Auto-refresh every {:?}", period);
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
    }

    fn trigger(&mut self, trigger: Trigger) {
        self.cancel_pending();
        let Some(config) = self.config.as_ref() else {
            return;
        };

        if trigger == Trigger::SourceChanged {
            self.retained_svg = None;
            self.retained_series = None;
        }

        match config.source_spec() {
            SourceSpec::Url(url) => {
                let route = match coordinates::extract_coordinates(&url) {
                    Some(coords) => Route::Forecast(coords),
                    None => Route::Direct(url),
                };
                tracing::info!("Acquiring {:?}", route);

                // A refresh over a valid document keeps showing it until replaced.
                let showing_document = self.state.borrow().document().is_some();
                if trigger == Trigger::SourceChanged || !showing_document {
                    self.publish(AcquisitionState::Loading);
                }
                self.start_attempt(route, 1, Duration::ZERO);
            }
            SourceSpec::LiteralSvg(svg) => {
                let theme = config.theme.clone();
                self.retained_series = None;
                match sanitize::sanitize(&svg, &theme) {
                    Ok(sanitized_html) => {
                        self.retained_svg = Some(svg.clone());
                        self.publish(AcquisitionState::Ready(AcquiredDocument {
                            raw_svg: svg,
                            sanitized_html,
                        }));
                    }
                    Err(e) => {
                        tracing::warn!("Configured svgCode could not be used: {}", e);
                        if !self.publish_stale() {
                            self.publish(AcquisitionState::Failed(e.user_friendly_message()));
                        }
                    }
                }
            }
            SourceSpec::None => {
                self.retained_svg = None;
                self.retained_series = None;
                self.publish(AcquisitionState::Idle);
            }
        }
    }

    fn start_attempt(&mut self, route: Route, attempt: u32, delay: Duration) {
        let future: AttemptFuture = match &route {
            Route::Forecast(coords) => {
                let source = Arc::clone(&self.forecast);
                let coords = *coords;
                Box::pin(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    source.fetch_forecast(coords).await.map(Acquired::Forecast)
                })
            }
            Route::Direct(url) => {
                let source = Arc::clone(&self.documents);
                let url = url.clone();
                Box::pin(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    source
                        .fetch_document(&url, attempt)
                        .await
                        .map(Acquired::Document)
                })
            }
        };

        self.pending = Some(PendingAttempt {
            generation: self.generation,
            attempt,
            route,
            future,
        });
    }

    /// Drops the in-flight attempt, if any, and invalidates its generation.
    fn cancel_pending(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            tracing::debug!("Cancelled attempt {} of {:?}", pending.attempt, pending.route);
        }
    }

    async fn settle(&mut self, outcome: AttemptOutcome) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if outcome.generation != self.generation || pending.generation != outcome.generation {
            tracing::debug!("Discarding result of superseded attempt {}", pending.attempt);
            return;
        }

        let result = match outcome.result {
            Ok(acquired) => self.commit(acquired).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.fail_attempt(pending.route, pending.attempt, e);
        }
    }

    async fn commit(&mut self, acquired: Acquired) -> Result<()> {
        let theme = self
            .config
            .as_ref()
            .map(|config| config.theme.clone())
            .unwrap_or_default();

        let (raw_svg, series) = match acquired {
            Acquired::Forecast(series) => (chart::render(&series, &theme), Some(series)),
            Acquired::Document(raw) => (raw, None),
        };
        let sanitized_html = sanitize::sanitize(&raw_svg, &theme)?;

        if let Err(e) = self.store.write_svg_code(&raw_svg).await {
            tracing::warn!("Failed to persist svgCode: {}", e);
        }

        self.retained_svg = Some(raw_svg.clone());
        self.retained_series = series;
        self.publish(AcquisitionState::Ready(AcquiredDocument {
            raw_svg,
            sanitized_html,
        }));
        Ok(())
    }

    fn fail_attempt(&mut self, route: Route, attempt: u32, error: MeteogramError) {
        if attempt < MAX_ATTEMPTS {
            let delay = retry_delay(attempt);
            tracing::warn!(
                "Attempt {}/{} failed ({}); retrying in {:?}",
                attempt,
                MAX_ATTEMPTS,
                error,
                delay
            );
            self.start_attempt(route, attempt + 1, delay);
            return;
        }

        let exhausted = MeteogramError::ExhaustedRetries {
            attempts: MAX_ATTEMPTS,
        };
        tracing::error!("{} for {:?}; last error: {}", exhausted, route, error);

        if self.publish_stale() {
            return;
        }

        match route {
            Route::Direct(url) => self.publish(AcquisitionState::Degraded(url)),
            Route::Forecast(_) => {
                self.publish(AcquisitionState::Failed(FORECAST_FAILURE_MESSAGE.to_string()))
            }
        }
    }

    /// Falls back to the retained document, or the configured `svgCode`.
    fn publish_stale(&mut self) -> bool {
        let Some(config) = self.config.as_ref() else {
            return false;
        };
        let theme = config.theme.clone();
        let candidates = [
            self.retained_svg.clone(),
            config.literal_svg().map(str::to_string),
        ];

        for raw_svg in candidates.into_iter().flatten() {
            match sanitize::sanitize(&raw_svg, &theme) {
                Ok(sanitized_html) => {
                    tracing::info!("Showing stale document");
                    self.retained_svg = Some(raw_svg.clone());
                    self.publish(AcquisitionState::Ready(AcquiredDocument {
                        raw_svg,
                        sanitized_html,
                    }));
                    return true;
                }
                Err(e) => tracing::debug!("Stale candidate rejected: {}", e),
            }
        }
        false
    }

    /// Re-themes the current document without touching the network.
    fn apply_theme(&mut self) {
        let Some(theme) = self.config.as_ref().map(|config| config.theme.clone()) else {
            return;
        };
        let Some(current) = self.state.borrow().document().cloned() else {
            return;
        };

        let raw_svg = match &self.retained_series {
            Some(series) => chart::render(series, &theme),
            None => current.raw_svg,
        };

        match sanitize::sanitize(&raw_svg, &theme) {
            Ok(sanitized_html) => {
                self.retained_svg = Some(raw_svg.clone());
                self.publish(AcquisitionState::Ready(AcquiredDocument {
                    raw_svg,
                    sanitized_html,
                }));
            }
            Err(e) => tracing::warn!("Re-theming failed, keeping current document: {}", e),
        }
    }

    fn publish(&self, state: AcquisitionState) {
        tracing::info!("Acquisition state -> {}", state.label());
        self.state.send_replace(state);
    }
}

/// Fields whose change reschedules the auto-refresh timer.
fn refresh_key(config: &WidgetConfig) -> (Option<&str>, bool, u64) {
    (
        config.source_url(),
        config.auto_refresh_enabled,
        config.refresh_interval,
    )
}

async fn next_outcome(pending: &mut Option<PendingAttempt>) -> AttemptOutcome {
    match pending {
        Some(pending) => AttemptOutcome {
            generation: pending.generation,
            result: (&mut pending.future).await,
        },
        None => std::future::pending().await,
    }
}

async fn next_tick(refresh: &mut Option<Interval>) {
    match refresh {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
