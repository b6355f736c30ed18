use core::convert::TryInto;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use ds18b20::Ds18b20;
use embedded_svc::{
    http::{Headers, Method},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{
        AnyIOPin, AnyInputPin, AnyOutputPin, IOPin, Input, InputOutput, InputPin, InterruptType,
        Output, OutputPin, PinDriver, Pull,
    },
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};
use one_wire_bus::{Address, OneWire};
use serde::Serialize;

use regulator_common::{
    config::NetworkConfig, render_status_page, Button, ButtonInbox, DataPayload, MenuOutcome,
    MenuState, Millis, ProbeLink, ProbeLinkChange, Regulator, RegulatorError, RegulatorTick,
    RelayState, RuntimeConfig, SettingsResponse, SettingsUpdate, SharedState, TemperatureSample,
};

const DS18B20_PIN: i32 = 4;
const MAX_HTTP_BODY: usize = 1024;
const CONVERSION_TIME: Duration = Duration::from_millis(750);

type HttpRequest<'r, 'c> =
    esp_idf_svc::http::server::Request<&'r mut esp_idf_svc::http::server::EspHttpConnection<'c>>;

// Conversions run in the background; the loop never waits 750 ms on the bus.
struct Probe {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    address: Option<Address>,
    conversion_started: Option<Instant>,
    last: TemperatureSample,
    delay: Ets,
}

impl Probe {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut one_wire_pin = PinDriver::input_output_od(pin)?;
        one_wire_pin.set_pull(Pull::Up)?;
        one_wire_pin.set_high()?;

        let one_wire = OneWire::new(one_wire_pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let mut probe = Self {
            one_wire,
            address: None,
            conversion_started: None,
            last: TemperatureSample::Disconnected,
            delay: Ets,
        };
        probe.refresh_address();
        Ok(probe)
    }

    fn poll(&mut self) -> TemperatureSample {
        match self.conversion_started {
            None => self.start_conversion(),
            Some(started) if started.elapsed() >= CONVERSION_TIME => {
                self.conversion_started = None;
                self.last = self.read_converted();
                self.start_conversion();
            }
            Some(_) => {}
        }
        self.last
    }

    fn refresh_address(&mut self) {
        let mut first: Option<Address> = None;
        let mut device_count = 0_u32;

        for addr in self.one_wire.devices(false, &mut self.delay) {
            match addr {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if first.is_none() && address.family_code() == ds18b20::FAMILY_CODE {
                        first = Some(address);
                    }
                }
                Err(err) => {
                    warn!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        self.address = first;
        match self.address {
            Some(address) => info!(
                "DS18B20 ready on GPIO{DS18B20_PIN} ({device_count} one-wire device(s), using {address:?})"
            ),
            None => warn!(
                "no DS18B20 found on GPIO{DS18B20_PIN} ({device_count} one-wire device(s) detected)"
            ),
        }
    }

    fn start_conversion(&mut self) {
        if self.address.is_none() {
            self.refresh_address();
        }
        if self.address.is_none() {
            self.last = TemperatureSample::Disconnected;
            return;
        }

        match ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay) {
            Ok(()) => self.conversion_started = Some(Instant::now()),
            Err(err) => {
                warn!("failed to start DS18B20 conversion: {err:?}");
                self.address = None;
                self.last = TemperatureSample::Disconnected;
            }
        }
    }

    fn read_converted(&mut self) -> TemperatureSample {
        let Some(address) = self.address else {
            return TemperatureSample::Disconnected;
        };
        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid DS18B20 address {address:?}: {err:?}");
                self.address = None;
                return TemperatureSample::Disconnected;
            }
        };

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => {
                debug!("[DS18B20] Temperature: {:.2}°C", data.temperature);
                TemperatureSample::from_celsius(data.temperature)
            }
            Err(err) => {
                warn!("failed to read DS18B20 data: {err:?}");
                self.address = None;
                TemperatureSample::Disconnected
            }
        }
    }
}

// ESP-IDF disarms a pin interrupt after it fires; `rearm` runs every loop.
struct ButtonPins {
    pins: Vec<(Button, PinDriver<'static, AnyInputPin, Input>)>,
}

impl ButtonPins {
    fn new(pins: [(Button, AnyInputPin); 3], inbox: &Arc<ButtonInbox>) -> anyhow::Result<Self> {
        let mut drivers = Vec::with_capacity(pins.len());
        for (button, pin) in pins {
            let mut driver = PinDriver::input(pin)?;
            driver.set_pull(Pull::Up)?;
            driver.set_interrupt_type(InterruptType::NegEdge)?;

            let inbox = inbox.clone();
            // SAFETY: the callback only touches atomics and the lock-free inbox.
            unsafe {
                driver.subscribe(move || {
                    inbox.on_edge(button, now_ms());
                })?;
            }
            driver.enable_interrupt()?;
            drivers.push((button, driver));
        }
        Ok(Self { pins: drivers })
    }

    fn rearm(&mut self) {
        for (button, driver) in &mut self.pins {
            if let Err(err) = driver.enable_interrupt() {
                warn!("failed to re-enable {} interrupt: {err:?}", button.as_str());
            }
        }
    }
}

struct Outputs {
    relay: PinDriver<'static, AnyOutputPin, Output>,
    backlight: PinDriver<'static, AnyOutputPin, Output>,
    relay_applied: Option<RelayState>,
    backlight_applied: Option<bool>,
}

impl Outputs {
    fn new(relay: AnyOutputPin, backlight: AnyOutputPin) -> anyhow::Result<Self> {
        Ok(Self {
            relay: PinDriver::output(relay)?,
            backlight: PinDriver::output(backlight)?,
            relay_applied: None,
            backlight_applied: None,
        })
    }

    fn apply(&mut self, relay: RelayState, backlight_on: bool) {
        if self.relay_applied != Some(relay) {
            let result = if relay.is_on() {
                self.relay.set_high()
            } else {
                self.relay.set_low()
            };
            match result {
                Ok(()) => self.relay_applied = Some(relay),
                Err(err) => warn!("failed to drive relay {}: {err:?}", relay.as_str()),
            }
        }

        if self.backlight_applied != Some(backlight_on) {
            let result = if backlight_on {
                self.backlight.set_high()
            } else {
                self.backlight.set_low()
            };
            match result {
                Ok(()) => self.backlight_applied = Some(backlight_on),
                Err(err) => warn!("failed to drive backlight: {err:?}"),
            }
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, pins, .. } = Peripherals::take()?;

    let shared = Arc::new(SharedState::new(&runtime.setpoints));
    let inbox = Arc::new(ButtonInbox::new(
        runtime.regulator.debounce_ms,
        runtime.regulator.debounce_mode,
    ));

    let mut outputs = Outputs::new(pins.gpio26.downgrade_output(), pins.gpio2.downgrade_output())
        .context("failed to initialize relay and backlight pins")?;
    outputs.apply(RelayState::Off, true);

    let mut buttons = ButtonPins::new(
        [
            (Button::Set, pins.gpio32.downgrade_input()),
            (Button::Up, pins.gpio33.downgrade_input()),
            (Button::Down, pins.gpio27.downgrade_input()),
        ],
        &inbox,
    )
    .context("failed to initialize buttons")?;

    let mut probe = Probe::new(pins.gpio4.downgrade()).context("failed to initialize probe")?;

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    let address = network_address(&wifi, runtime.network.http_port);

    let server = create_http_server(shared.clone(), runtime.network.http_port)?;
    info!("status page at {address}");

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    let loop_period = Duration::from_millis(runtime.regulator.loop_period_ms.into());
    let mut regulator = Regulator::new(runtime.regulator, shared);
    let mut link = ProbeLink::default();

    loop {
        buttons.rearm();

        let sample = probe.poll();
        match link.observe(sample) {
            Some(ProbeLinkChange::Connected(celsius)) => info!("probe reading {celsius:.1}°C"),
            Some(ProbeLinkChange::Lost) => warn!("{}", RegulatorError::SensorDisconnected),
            None => {}
        }

        let tick = regulator.tick(now_ms(), sample, inbox.drain());
        outputs.apply(tick.relay, tick.backlight_on);
        report_tick(&tick, &regulator, &address);

        let dropped = inbox.take_dropped();
        if dropped > 0 {
            warn!("button inbox full; dropped {dropped} press(es)");
        }

        thread::sleep(loop_period);
    }
}

fn report_tick(tick: &RegulatorTick, regulator: &Regulator, address: &str) {
    if tick.relay_changed {
        let setpoint = regulator.shared().setpoints.get();
        info!(
            "relay {} (band {:.1}..{:.1}°C)",
            tick.relay.as_str(),
            setpoint.lower_bound(),
            setpoint.upper_bound()
        );
    }

    for outcome in &tick.menu_outcomes {
        match outcome {
            MenuOutcome::Activated => info!("menu opened"),
            MenuOutcome::Advanced(state) => info!("menu: {}", state.as_str()),
            MenuOutcome::Adjusted { field, value } => info!("menu: {field:?} set to {value:.1}°C"),
            MenuOutcome::Ignored => {}
        }
    }

    if tick.menu_changed && tick.menu == MenuState::ViewingNetworkInfo {
        info!("network info: {address}");
    }
    if tick.menu_timed_out {
        info!("menu closed after inactivity");
    }
}

fn now_ms() -> Millis {
    // Microseconds since boot; truncation to u32 is the wrap.
    let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    (micros / 1_000) as Millis
}

fn create_http_server(
    shared: Arc<SharedState>,
    http_port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port,
        stack_size: 10 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    {
        let shared = shared.clone();
        server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
            let page = render_status_page(&shared.snapshot());
            req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?
                .write_all(page.as_bytes())?;
            Ok(())
        })?;
    }

    {
        let shared = shared.clone();
        server.fn_handler("/data", Method::Get, move |req| {
            write_json(req, &DataPayload::from(&shared.snapshot()))
        })?;
    }

    server.fn_handler::<anyhow::Error, _>("/settings", Method::Post, move |mut req| {
        let query = req
            .uri()
            .split_once('?')
            .map(|(_, query)| query.to_string())
            .unwrap_or_default();
        let body = read_request_body(&mut req).unwrap_or_else(|err| {
            warn!("ignoring settings body: {err:#}");
            Vec::new()
        });
        let body = String::from_utf8_lossy(&body);

        let update = SettingsUpdate::from_forms([query.as_str(), body.as_ref()]);
        for err in &update.rejected {
            warn!("ignoring settings field: {err}");
        }
        if !update.is_empty() {
            update.apply(&shared.setpoints);
            let setpoint = shared.setpoints.get();
            info!(
                "settings updated over http: target {:.1}°C, hysteresis {:.1}°C",
                setpoint.target, setpoint.hysteresis
            );
        }

        write_json(req, &SettingsResponse::updated())
    })?;

    Ok(server)
}

fn read_request_body(req: &mut HttpRequest<'_, '_>) -> anyhow::Result<Vec<u8>> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_HTTP_BODY {
        return Err(anyhow!("request body too large"));
    }

    let mut body = vec![0_u8; len];
    if len > 0 {
        req.read_exact(&mut body)?;
    }
    Ok(body)
}

fn write_json<T: Serialize>(req: HttpRequest<'_, '_>, payload: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    req.into_response(
        200,
        Some("OK"),
        &[("Content-Type", "application/json; charset=utf-8")],
    )?
    .write_all(&body)?;
    Ok(())
}

fn has_station_credentials(network: &NetworkConfig) -> bool {
    let ssid = network.wifi_ssid.trim();
    !ssid.is_empty() && ssid != "CHANGE_ME"
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        runtime.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if runtime.network.wifi_pass.is_empty() {
        runtime.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

    if !has_station_credentials(network) {
        warn!("wifi credentials missing; running offline");
        return Ok(esp_wifi);
    }

    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let attempts = network.connect_attempts;
    let mut last_err = None;
    for attempt in 1..=attempts {
        info!("wifi connect attempt {attempt}/{attempts}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                last_err = None;
                break;
            }
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < attempts {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(network.retry_delay_ms));
        }
    }

    if let Some(err) = last_err {
        warn!(
            "{}; last error: {err:#}",
            RegulatorError::NetworkUnavailable { attempts }
        );
        let _ = wifi.disconnect();
    }

    Ok(esp_wifi)
}

fn network_address(wifi: &EspWifi<'static>, http_port: u16) -> String {
    match wifi.sta_netif().get_ip_info() {
        Ok(info) if !info.ip.is_unspecified() => format!("http://{}:{http_port}", info.ip),
        Ok(_) => "offline".to_string(),
        Err(err) => {
            warn!("failed to read station ip: {err:?}");
            "offline".to_string()
        }
    }
}
