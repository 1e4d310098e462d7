use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use weather_client::{
    config::RuntimeConfig,
    device::{ConnectivitySignal, FixedGeolocator},
    error::{AppError, ErrorKind},
    model::{
        AqiCategory, CityLocation, Coordinates, FetchSource, TemperatureUnit, ValidationError,
        WeatherSnapshot, validate_coordinates,
    },
    providers::{HttpProviders, ProviderApi},
    session::{SessionState, WeatherSession},
    storage::{FileStore, KeyValueStore},
    weather_code,
};

const LOG_ENV: &str = "WEATHER_LOG";
const ENVELOPE_SCHEMA_VERSION: &str = "v1";
const ERROR_CODE_USER_CACHE_MISS: &str = "user.cache_miss";
const ERROR_CODE_USER_NO_LAST_QUERY: &str = "user.no_last_query";
const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
const ERROR_CODE_RUNTIME_STORAGE: &str = "runtime.storage_failed";
const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";

#[derive(Debug, Parser)]
#[command(author, version, about = "Weather client (Open-Meteo, no token required)")]
struct Cli {
    /// Treat the network as unreachable; only cached data is served.
    #[arg(long, global = true)]
    offline: bool,
    /// Print the JSON envelope instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Weather for a city, e.g. "Dublin, Leinster, Ireland".
    Search {
        text: String,
        #[arg(long)]
        fahrenheit: bool,
    },
    /// Weather for the device position.
    Locate {
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,
        /// Skip the coordinate cache.
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        fahrenheit: bool,
    },
    /// Cached weather for a history label; never uses the network.
    Cached { label: String },
    /// The last successful result.
    Last,
    /// Recent searches, most recent first.
    History {
        #[arg(long)]
        clear: bool,
    },
    /// City suggestions for partial input.
    Suggest { text: String },
}

impl Cli {
    fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Search { .. } => "weather.search",
            Commands::Locate { .. } => "weather.locate",
            Commands::Cached { .. } => "weather.cached",
            Commands::Last => "weather.last",
            Commands::History { .. } => "weather.history",
            Commands::Suggest { .. } => "weather.suggest",
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command_name();
    let json_output = cli.json;
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, json_output, &error);
            std::process::exit(error.exit_code());
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<String, AppError> {
    let config = RuntimeConfig::from_env();
    let providers = HttpProviders::new(config.http_timeout, config.retry_policy).map_err(|error| {
        AppError::runtime(error.to_string()).with_code(ERROR_CODE_RUNTIME_PROVIDER_INIT)
    })?;
    let store = Arc::new(FileStore::new(config.cache_dir.clone()));
    run_with(cli, &config, providers, store)
}

fn run_with<P, S>(
    cli: Cli,
    config: &RuntimeConfig,
    providers: P,
    store: Arc<S>,
) -> Result<String, AppError>
where
    P: ProviderApi,
    S: KeyValueStore,
{
    let command = cli.command_name();
    let position = match &cli.command {
        Commands::Locate { lat, lon, .. } => device_position(*lat, *lon)?,
        _ => None,
    };
    let connectivity = Arc::new(ConnectivitySignal::new(!cli.offline));
    let session = WeatherSession::new(
        config,
        providers,
        store,
        FixedGeolocator::new(position),
        connectivity,
    );

    let output = match cli.command {
        Commands::Search { text, fahrenheit } => {
            session.set_unit(TemperatureUnit::from_fahrenheit_flag(fahrenheit))?;
            session.set_city(&text);
            session.handle_search()?;
            Output::Report(session.state())
        }
        Commands::Locate {
            refresh,
            fahrenheit,
            ..
        } => {
            session.set_unit(TemperatureUnit::from_fahrenheit_flag(fahrenheit))?;
            session.use_current_location(refresh)?;
            Output::Report(session.state())
        }
        Commands::Cached { label } => {
            if !session.fetch_cached_only(&label) {
                return Err(AppError::user(format!("no cached weather for '{label}'"))
                    .with_code(ERROR_CODE_USER_CACHE_MISS));
            }
            Output::Report(session.state())
        }
        Commands::Last => {
            if !session.restore_last_query() {
                return Err(AppError::user("no previous weather query")
                    .with_code(ERROR_CODE_USER_NO_LAST_QUERY));
            }
            Output::Report(session.state())
        }
        Commands::History { clear } => {
            if clear {
                session.clear_history().map_err(|error| {
                    AppError::runtime(error.to_string()).with_code(ERROR_CODE_RUNTIME_STORAGE)
                })?;
            }
            Output::History(session.history())
        }
        Commands::Suggest { text } => Output::Suggestions(session.suggest(&text)?),
    };

    if cli.json {
        render_json_envelope(command, &output)
    } else {
        Ok(format_text_output(&output))
    }
}

fn device_position(lat: Option<f64>, lon: Option<f64>) -> Result<Option<Coordinates>, AppError> {
    match (lat, lon) {
        (Some(latitude), Some(longitude)) => {
            validate_coordinates(latitude, longitude).map_err(user_invalid_input)?;
            Ok(Some(Coordinates {
                latitude,
                longitude,
            }))
        }
        (None, None) => Ok(None),
        _ => Err(user_invalid_input(ValidationError::PartialCoordinates)),
    }
}

enum Output {
    Report(SessionState),
    History(Vec<String>),
    Suggestions(Vec<CityLocation>),
}

#[derive(Debug, Serialize)]
struct WeatherReport<'a> {
    weather: &'a WeatherSnapshot,
    condition: &'static str,
    unit: TemperatureUnit,
    source: Option<FetchSource>,
    air_quality: Option<AirQualitySummary<'a>>,
    warning: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AirQualitySummary<'a> {
    time: &'a str,
    european_aqi: Option<f64>,
    category: Option<AqiCategory>,
}

fn weather_report(state: &SessionState) -> Result<WeatherReport<'_>, AppError> {
    let weather = state
        .weather
        .as_ref()
        .ok_or_else(|| AppError::runtime("no weather published"))?;

    let air_quality = state
        .air_quality
        .as_ref()
        .and_then(|air_quality| air_quality.latest())
        .map(|reading| AirQualitySummary {
            time: &reading.time,
            european_aqi: reading.european_aqi,
            category: reading.european_aqi.map(AqiCategory::from_index),
        });

    Ok(WeatherReport {
        weather,
        condition: weather_code::condition(weather.weathercode),
        unit: state.unit,
        source: state.last_fetch_source,
        air_quality,
        warning: state.warning.as_deref(),
    })
}

fn render_json_envelope(command: &str, output: &Output) -> Result<String, AppError> {
    let result = match output {
        Output::Report(state) => serde_json::to_value(weather_report(state)?),
        Output::History(entries) => Ok(json!({ "entries": entries })),
        Output::Suggestions(locations) => {
            let items: Vec<_> = locations
                .iter()
                .map(|location| json!({ "label": location.label(), "location": location }))
                .collect();
            Ok(json!({ "suggestions": items }))
        }
    }
    .map_err(|error| serialize_error(format!("failed to serialize output: {error}")))?;

    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| serialize_error(format!("failed to serialize output envelope: {error}")))
}

fn format_text_output(output: &Output) -> String {
    match output {
        Output::Report(state) => match weather_report(state) {
            Ok(report) => format_report(&report),
            Err(error) => error.message,
        },
        Output::History(entries) if entries.is_empty() => "no search history".to_string(),
        Output::History(entries) => entries.join("\n"),
        Output::Suggestions(locations) if locations.is_empty() => "no matches".to_string(),
        Output::Suggestions(locations) => locations
            .iter()
            .map(|location| {
                format!(
                    "{} ({:.4},{:.4})",
                    location.label(),
                    location.latitude,
                    location.longitude
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn format_report(report: &WeatherReport<'_>) -> String {
    let weather = report.weather;
    let temperature = report.unit.temperature_symbol();
    let mut lines = vec![format!(
        "{} | {} {:.1}{} | wind {:.1} {} | humidity {:.0}% | {}",
        weather.location,
        weather_code::summary_en(weather.weathercode),
        weather.temperature,
        temperature,
        weather.windspeed,
        report.unit.windspeed_symbol(),
        weather.humidity,
        weather.current_time
    )];

    for day in &weather.forecast {
        lines.push(format!(
            "{} {} {:.1}~{:.1}{}",
            day.date,
            weather_code::summary_en(day.code),
            day.min,
            day.max,
            temperature
        ));
    }

    if let Some(air_quality) = &report.air_quality {
        match (air_quality.european_aqi, air_quality.category) {
            (Some(aqi), Some(category)) => lines.push(format!(
                "air quality: AQI {aqi:.0} ({}) at {}",
                category.label(),
                air_quality.time
            )),
            _ => lines.push(format!("air quality: n/a at {}", air_quality.time)),
        }
    }
    if let Some(warning) = report.warning {
        lines.push(format!("warning: {warning}"));
    }

    lines.join("\n")
}

fn emit_error(command: &str, json_output: bool, error: &AppError) {
    if !json_output {
        eprintln!("error[{}]: {}", error.code, error.message);
        return;
    }

    let payload = json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error": {
            "code": error.code,
            "message": error.message,
            "details": {
                "kind": error_kind_label(error.kind),
                "exit_code": error.exit_code(),
            }
        }
    });
    let rendered = serde_json::to_string(&payload).unwrap_or_else(|_| {
        format!(
            "{{\"schema_version\":\"{ENVELOPE_SCHEMA_VERSION}\",\"command\":\"{command}\",\"ok\":false,\"error\":{{\"code\":\"{ERROR_CODE_RUNTIME_SERIALIZE}\",\"message\":\"failed to serialize error envelope\"}}}}"
        )
    });
    println!("{rendered}");
}

fn user_invalid_input(error: ValidationError) -> AppError {
    AppError::user(error.to_string())
}

fn serialize_error(message: String) -> AppError {
    AppError::runtime(message).with_code(ERROR_CODE_RUNTIME_SERIALIZE)
}

fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::User => "user",
        ErrorKind::Runtime => "runtime",
    }
}
