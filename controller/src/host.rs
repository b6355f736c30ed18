use std::{
    collections::HashMap,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Query, State,
    },
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Json, Router,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
};
use tracing::{debug, info, warn};

use regulator_common::{
    render_status_page, Button, ButtonInbox, DataPayload, MenuOutcome, MenuState, Millis,
    ProbeLink, ProbeLinkChange, Regulator, RegulatorError, RegulatorTick, RelayState,
    RuntimeConfig, SettingsResponse, SettingsUpdate, SharedState, TemperatureSample,
};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    shared: Arc<SharedState>,
}

// First-order thermal model standing in for the DS18B20.
struct SimulatedProbe {
    temp_c: f32,
    ambient_c: f32,
    heater_c_per_s: f32,
    loss_per_s: f32,
    disconnected: bool,
}

impl SimulatedProbe {
    fn from_env() -> Self {
        let env_f32 = |key: &str, default: f32| {
            std::env::var(key)
                .ok()
                .and_then(|value| value.parse::<f32>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(default)
        };

        Self {
            temp_c: env_f32("REGULATOR_SIM_START_C", 22.0),
            ambient_c: env_f32("REGULATOR_SIM_AMBIENT_C", 18.0),
            heater_c_per_s: env_f32("REGULATOR_SIM_HEATER_C_PER_S", 0.08),
            loss_per_s: env_f32("REGULATOR_SIM_LOSS_PER_S", 0.005),
            disconnected: std::env::var("REGULATOR_SIM_DISCONNECTED")
                .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    fn read(&mut self, relay: RelayState, dt_s: f32) -> TemperatureSample {
        let heating = if relay.is_on() { self.heater_c_per_s } else { 0.0 };
        let loss = self.loss_per_s * (self.temp_c - self.ambient_c);
        self.temp_c += (heating - loss) * dt_s;

        if self.disconnected {
            TemperatureSample::Disconnected
        } else {
            TemperatureSample::from_celsius(self.temp_c)
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let shared = Arc::new(SharedState::new(&runtime.setpoints));
    let inbox = Arc::new(ButtonInbox::new(
        runtime.regulator.debounce_ms,
        runtime.regulator.debounce_mode,
    ));
    let regulator = Regulator::new(runtime.regulator.clone(), shared.clone());

    let port = std::env::var("REGULATOR_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    spawn_button_reader(inbox.clone());
    spawn_control_loop(regulator, inbox, SimulatedProbe::from_env(), addr);
    spawn_status_log_loop(shared.clone());

    let app = router(shared);

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("regulator listening on http://{addr}");
            axum::serve(listener, app).await?;
        }
        Err(err) => {
            // The device keeps regulating without its HTTP mirror.
            warn!("failed to bind status server at {addr}: {err}; running without HTTP");
            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for shutdown signal")?;
        }
    }
    Ok(())
}

fn router(shared: Arc<SharedState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/data", get(handle_get_data))
        .route("/settings", post(handle_post_settings))
        .with_state(AppState { shared })
}

async fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let Some(path) = std::env::var_os("REGULATOR_CONFIG").map(PathBuf::from) else {
        return Ok(RuntimeConfig::default());
    };

    let raw = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let runtime = serde_json::from_slice::<RuntimeConfig>(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    info!("loaded runtime config from {}", path.display());
    Ok(runtime)
}

fn spawn_button_reader(inbox: Arc<ButtonInbox>) {
    tokio::spawn(async move {
        info!("buttons: type s (set), u (up) or d (down) and press enter");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match Button::from_command(&line) {
                    Some(button) => {
                        if !inbox.on_edge(button, monotonic_ms()) {
                            debug!("{} press debounced", button.as_str());
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("unknown button command {line:?}"),
                },
                Ok(None) => {
                    info!("stdin closed; button input disabled");
                    break;
                }
                Err(err) => {
                    warn!("stdin read failed: {err}");
                    break;
                }
            }
        }
    });
}

fn spawn_control_loop(
    mut regulator: Regulator,
    inbox: Arc<ButtonInbox>,
    mut probe: SimulatedProbe,
    addr: SocketAddr,
) {
    tokio::spawn(async move {
        let period = Duration::from_millis(regulator.config().loop_period_ms.into());
        let mut interval = tokio::time::interval(period);
        let mut backlight_on = true;
        let mut link = ProbeLink::default();

        loop {
            interval.tick().await;

            let sample = probe.read(regulator.relay(), period.as_secs_f32());
            match link.observe(sample) {
                Some(ProbeLinkChange::Connected(celsius)) => {
                    info!("probe reading {celsius:.1} °C")
                }
                Some(ProbeLinkChange::Lost) => warn!("{}", RegulatorError::SensorDisconnected),
                None => {}
            }
            let tick = regulator.tick(monotonic_ms(), sample, inbox.drain());
            report_tick(&tick, &regulator, addr);

            if tick.backlight_on != backlight_on {
                backlight_on = tick.backlight_on;
                debug!("backlight {}", if backlight_on { "on" } else { "off" });
            }

            let dropped = inbox.take_dropped();
            if dropped > 0 {
                warn!("button inbox full; dropped {dropped} press(es)");
            }
        }
    });
}

fn report_tick(tick: &RegulatorTick, regulator: &Regulator, addr: SocketAddr) {
    if tick.relay_changed {
        let setpoint = regulator.shared().setpoints.get();
        info!(
            "relay {} (band {:.1}..{:.1} °C)",
            tick.relay.as_str(),
            setpoint.lower_bound(),
            setpoint.upper_bound()
        );
    }

    for outcome in &tick.menu_outcomes {
        match outcome {
            MenuOutcome::Activated => info!("menu opened"),
            MenuOutcome::Advanced(state) => info!("menu: {}", state.as_str()),
            MenuOutcome::Adjusted { field, value } => info!("menu: {field:?} set to {value:.1} °C"),
            MenuOutcome::Ignored => debug!("menu: press ignored"),
        }
    }

    if tick.menu_changed && tick.menu == MenuState::ViewingNetworkInfo {
        info!("network info: http://{addr}");
    }
    if tick.menu_timed_out {
        info!("menu closed after inactivity");
    }
}

fn spawn_status_log_loop(shared: Arc<SharedState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATUS_LOG_INTERVAL);
        loop {
            interval.tick().await;

            match serde_json::to_string(&DataPayload::from(&shared.snapshot())) {
                Ok(body) => info!("status {body}"),
                Err(err) => warn!("status serialization failed: {err}"),
            }
        }
    });
}

async fn handle_root(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_status_page(&state.shared.snapshot()))
}

async fn handle_get_data(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataPayload::from(&state.shared.snapshot()))
}

async fn handle_post_settings(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> impl IntoResponse {
    let query = query.map(|Query(params)| params).unwrap_or_else(|err| {
        warn!("ignoring settings query: {err}");
        HashMap::new()
    });
    // Query-only posts carry no form content type.
    let form = form.map(|Form(params)| params).unwrap_or_else(|err| {
        debug!("no settings form body: {err}");
        HashMap::new()
    });

    let update = SettingsUpdate::from_pairs(query.iter().chain(form.iter()));
    for err in &update.rejected {
        warn!("ignoring settings field: {err}");
    }

    if !update.is_empty() {
        update.apply(&state.shared.setpoints);
        let setpoint = state.shared.setpoints.get();
        info!(
            "settings updated over http: target {:.1} °C, hysteresis {:.1} °C",
            setpoint.target, setpoint.hysteresis
        );
    }

    Json(SettingsResponse::updated())
}

fn monotonic_ms() -> Millis {
    static START: OnceLock<Instant> = OnceLock::new();
    // Truncation is the wrap.
    START.get_or_init(Instant::now).elapsed().as_millis() as Millis
}
