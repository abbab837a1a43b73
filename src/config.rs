use std::time::Duration;

use clap::Parser;

use crate::collectors::is_reserved_param;
use crate::collectors::scheduler::{FetchPlan, ScheduleConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "jobaggregator",
    about = "Pulls job postings from external job boards into the job database"
)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true", action = clap::ArgAction::Set)]
    pub run_migrations: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Collectors to run, comma separated
    #[arg(
        long,
        env = "COLLECTORS",
        value_delimiter = ',',
        default_value = "ycombinator,arbeitnow"
    )]
    pub collectors: Vec<String>,

    /// RapidAPI key for the Y Combinator listing
    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    pub rapidapi_key: Option<String>,

    /// Maximum pages fetched per source and run (0 = unbounded)
    #[arg(long, env = "MAX_PAGES", default_value = "3")]
    pub max_pages: usize,

    /// Maximum jobs kept per source and run (0 = unbounded)
    #[arg(long, env = "MAX_JOBS", default_value = "300")]
    pub max_jobs: usize,

    /// Only fetch postings from the last N days (default: 30)
    #[arg(long, env = "POSTED_WITHIN_DAYS")]
    pub posted_within_days: Option<u32>,

    /// Location filter forwarded to sources that support one
    #[arg(long, env = "LOCATION_FILTER")]
    pub location: Option<String>,

    /// Extra source query parameter as key=value, repeatable
    #[arg(long = "extra-param", value_parser = parse_key_val)]
    pub extra_params: Vec<(String, String)>,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Pause between page requests to one source, in milliseconds
    #[arg(long, env = "PAGE_DELAY_MS", default_value = "500")]
    pub page_delay_ms: u64,

    /// Give up waiting for a run after this many seconds
    #[arg(long, env = "RUN_TIMEOUT_SECS", default_value = "1800")]
    pub run_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run on a schedule and serve ops endpoints (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,

        /// Hours between scheduled runs
        #[arg(long, env = "RUN_INTERVAL_HOURS", default_value = "24")]
        interval_hours: u64,

        /// Fire the first scheduled run at the next UTC midnight
        #[arg(long, env = "ALIGN_TO_MIDNIGHT")]
        align_to_midnight: bool,
    },
    /// Run a single aggregation and exit
    RunOnce,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    if is_reserved_param(key) {
        return Err(format!(
            "'{key}' is set by the paging loop and cannot be overridden"
        ));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            interval_hours: std::env::var("RUN_INTERVAL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            align_to_midnight: std::env::var("ALIGN_TO_MIDNIGHT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn fetch_plan(&self) -> FetchPlan {
        FetchPlan {
            max_pages: self.max_pages,
            max_jobs: self.max_jobs,
            posted_within: self
                .posted_within_days
                .map(|days| chrono::Duration::days(i64::from(days))),
            location: self.location.clone().filter(|l| !l.trim().is_empty()),
            extra_params: self.extra_params.iter().cloned().collect(),
        }
    }

    pub fn schedule(&self, interval_hours: u64, align_to_midnight: bool) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_secs(interval_hours.max(1) * 3600),
            run_timeout: self.run_timeout(),
            align_to_midnight,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["jobaggregator", "--database-url", "postgres://localhost/jobs"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn run_once_with_limits_and_filters() {
        let config = parse(&[
            "--collectors",
            "arbeitnow",
            "--max-pages",
            "5",
            "--max-jobs",
            "0",
            "--posted-within-days",
            "7",
            "--location",
            "Berlin",
            "--extra-param",
            "visa_sponsorship=true",
            "--extra-param",
            "remote = 1",
            "run-once",
        ]);

        assert_eq!(config.command, Some(Command::RunOnce));
        assert_eq!(config.collectors, vec!["arbeitnow"]);

        let plan = config.fetch_plan();
        assert_eq!(plan.max_pages, 5);
        assert_eq!(plan.max_jobs, 0);
        assert_eq!(plan.posted_within, Some(chrono::Duration::days(7)));
        assert_eq!(plan.location.as_deref(), Some("Berlin"));
        assert_eq!(plan.extra_params.get("visa_sponsorship").map(String::as_str), Some("true"));
        assert_eq!(plan.extra_params.get("remote").map(String::as_str), Some("1"));
    }

    #[test]
    fn serve_schedule_uses_hours() {
        let config = parse(&["serve", "--interval-hours", "12", "--align-to-midnight"]);
        let Some(Command::Serve {
            interval_hours,
            align_to_midnight,
            ..
        }) = config.command.clone()
        else {
            panic!("expected serve");
        };
        let schedule = config.schedule(interval_hours, align_to_midnight);
        assert_eq!(schedule.interval, Duration::from_secs(12 * 3600));
        assert!(schedule.align_to_midnight);
        assert_eq!(schedule.run_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn malformed_extra_param_is_rejected() {
        let result = Config::try_parse_from([
            "jobaggregator",
            "--database-url",
            "postgres://localhost/jobs",
            "--extra-param",
            "novalue",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn paging_keys_cannot_be_overridden() {
        for param in ["offset=0", "page=3", " PAGE =1"] {
            assert!(parse_key_val(param).is_err(), "{param} should be rejected");
        }
        assert_eq!(
            parse_key_val("description_type=text"),
            Ok(("description_type".to_string(), "text".to_string()))
        );
    }
}
