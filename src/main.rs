use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use smartprobe::collectors::smart_cache::{CacheStore, SmartCache};
use smartprobe::collectors::surface::{self, ScanType};
use smartprobe::collectors::{self, DeviceAccessAdapter};
use smartprobe::config::Config;
use smartprobe::health::HealthVerdict;
use smartprobe::models::device::DeviceInfo;
use smartprobe::models::smart::SmartRecord;
use smartprobe::orchestrator::{get_smart_data, Assessment, QueryContext};
use smartprobe::util::human::fmt_bytes;
use smartprobe::util::logging;
use smartprobe::util::report::{self, Report, ReportFormat};
use smartprobe::SmartError;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "smartprobe", about = "Read and assess SMART health of ATA and NVMe drives", version)]
struct Cli {
    /// List detected drives and exit
    #[arg(long)]
    list_drives: bool,

    /// Print SMART data and health assessment for a drive
    #[arg(long, value_name = "PATH")]
    smart: Option<String>,

    /// Print SMART data as JSON, optionally writing it to a file
    #[arg(long, value_name = "PATH", num_args = 1..=2)]
    smart_json: Option<Vec<String>>,

    /// Read-only surface scan of a drive
    #[arg(long, value_name = "PATH")]
    surface: Option<String>,

    /// Surface scan type: quick or deep
    #[arg(long = "type", default_value = "quick")]
    scan_type: ScanType,

    /// Print identity information for a drive
    #[arg(long, value_name = "PATH")]
    info: Option<String>,

    /// Write a full report for a drive
    #[arg(long, value_name = "PATH")]
    report: Option<String>,

    /// Report format: txt, json, csv (default from config)
    #[arg(long)]
    format: Option<String>,

    /// Report output file (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// One-shot health check: exit 0=OK, 1=WARNING/PREFAIL, 2=FAILING, 3=UNKNOWN
    #[arg(long, value_name = "PATH")]
    check: Option<String>,

    /// Bypass the SMART cache for this run
    #[arg(long)]
    no_cache: bool,

    /// Log filter, e.g. "debug" (overrides RUST_LOG and config)
    #[arg(long)]
    log_level: Option<String>,

    /// Print config file path and current values, then exit
    #[arg(long)]
    config: bool,

    /// Generate shell completions and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<clap_complete::Shell>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "smartprobe", &mut io::stdout());
        return Ok(());
    }

    let cfg = Config::load();
    let env_filter = std::env::var("RUST_LOG").ok();
    let filter = logging::resolve_filter(cli.log_level.as_deref(), env_filter.as_deref(), cfg.logging.level.as_deref());
    logging::init(&filter, cfg.logging.file.as_deref())?;

    if cli.config {
        return run_print_config(&cfg);
    }

    let mut session = Session::new(cfg, cli.no_cache);

    if cli.list_drives {
        return run_list_drives(&session);
    }
    if let Some(path) = &cli.info {
        return run_info(&session, path);
    }
    if let Some(path) = &cli.smart {
        return run_report(&mut session, path, ReportFormat::Txt, None);
    }
    if let Some(args) = &cli.smart_json {
        let out = args.get(1).map(PathBuf::from);
        return run_report(&mut session, &args[0], ReportFormat::Json, out);
    }
    if let Some(path) = &cli.report {
        let fmt_name = cli.format.clone().unwrap_or_else(|| session.cfg.report.default_format.clone());
        let format: ReportFormat = fmt_name.parse()?;
        return run_report(&mut session, path, format, cli.output.clone());
    }
    if let Some(path) = &cli.surface {
        return run_surface(&session, path, cli.scan_type);
    }
    if let Some(path) = &cli.check {
        return run_check(&mut session, path);
    }

    Cli::command().print_help()?;
    println!();
    Ok(())
}

/// One CLI invocation: the adapter chain plus the persisted cache store.
struct Session {
    cfg:     Config,
    adapter: Box<dyn DeviceAccessAdapter>,
    store:   Option<CacheStore>,
    caching: bool,
}

impl Session {
    fn new(cfg: Config, no_cache: bool) -> Self {
        let adapter = collectors::platform_adapter(&cfg.general);
        let caching = cfg.cache.enabled && !no_cache;
        let store = (caching && cfg.cache.persist).then(|| CacheStore::load(cfg.cache.capacity));
        Self { cfg, adapter, store, caching }
    }

    fn query(&mut self, path: &str) -> Result<(QueryContext, SmartRecord)> {
        let (ctx, result) = self.read(path);
        let record = result.with_context(|| format!("cannot read SMART data from {}", path))?;
        Ok((ctx, record))
    }

    /// Like [`Session::query`] but keeps the context when the read fails, so
    /// callers can still report the failed attempt.
    fn read(&mut self, path: &str) -> (QueryContext, Result<SmartRecord, SmartError>) {
        let mut cache = SmartCache::new(self.caching, self.cfg.cache.ttl_seconds);
        if let Some(entry) = self.store.as_ref().and_then(|s| s.get(path)) {
            cache.restore(entry.clone());
        }
        let mut ctx = QueryContext::new(cache);
        let result = get_smart_data(self.adapter.as_ref(), path, &mut ctx);

        if let Some(store) = &mut self.store {
            store.put(path, ctx.cache.entry().clone());
            store.save();
        }
        (ctx, result)
    }

    /// Identity for display; falls back to the bare path when unavailable.
    fn device_info(&self, path: &str, known: Option<DeviceInfo>) -> DeviceInfo {
        let mut info = known
            .or_else(|| self.adapter.basic_info(path).ok())
            .unwrap_or_else(|| DeviceInfo::new(path));
        if info.size_bytes.is_none() {
            info.size_bytes = self.adapter.device_size(path).ok();
        }
        info
    }
}

fn run_list_drives(session: &Session) -> Result<()> {
    let drives = session.adapter.list_drives()?;
    if drives.is_empty() {
        return Err(SmartError::NoDrivesFound.into());
    }
    println!("{:<16} {:<6} {:<6} {:>10}  {}", "Device", "Type", "Bus", "Size", "Model");
    for path in &drives {
        let info = session.device_info(path, None);
        let size = info.size_bytes.map(fmt_bytes).unwrap_or_else(|| "?".into());
        println!(
            "{:<16} {:<6} {:<6} {:>10}  {}",
            path, info.media_label(), info.bus.label(), size, info.model_or_unknown()
        );
    }
    Ok(())
}

fn run_info(session: &Session, path: &str) -> Result<()> {
    let info = session
        .adapter
        .basic_info(path)
        .with_context(|| format!("cannot identify {}", path))?;
    let info = session.device_info(path, Some(info));
    println!("Device:    {}", info.path);
    println!("Model:     {}", info.model_or_unknown());
    println!("Serial:    {}", info.serial.as_deref().unwrap_or("-"));
    println!("Firmware:  {}", info.firmware.as_deref().unwrap_or("-"));
    println!("Type:      {} ({})", info.kind, info.media_label());
    println!("Bus:       {}", info.bus.label());
    match info.size_bytes {
        Some(size) => println!("Capacity:  {} ({} bytes)", fmt_bytes(size), size),
        None       => println!("Capacity:  unknown"),
    }
    Ok(())
}

fn run_report(session: &mut Session, path: &str, format: ReportFormat, output: Option<PathBuf>) -> Result<()> {
    let (mut ctx, result) = session.read(path);
    let record = match result {
        Ok(record) => record,
        Err(e) => {
            if format == ReportFormat::Json {
                let info = session.device_info(path, ctx.device_info.take());
                let text = report::render_json_failure(&info, ctx.last_execution.as_ref());
                if let Err(w) = emit_report(&text, format, output.as_ref()) {
                    tracing::warn!(path, "failure report not written: {:#}", w);
                }
            }
            return Err(e).with_context(|| format!("cannot read SMART data from {}", path));
        }
    };
    let info = session.device_info(path, ctx.device_info.take());
    let assessment = Assessment::of(&record, session.cfg.alerts.spare_threshold_override);
    let text = report::render(format, &Report {
        info:       &info,
        execution:  ctx.last_execution.as_ref(),
        record:     &record,
        assessment: &assessment,
    });
    emit_report(&text, format, output.as_ref())
}

fn emit_report(text: &str, format: ReportFormat, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(file) => {
            std::fs::write(file, format!("{}\n", text.trim_end()))
                .with_context(|| format!("cannot write report to {}", file.display()))?;
            eprintln!("{} report written to {}", format.extension(), file.display());
        }
        None => println!("{}", text.trim_end()),
    }
    Ok(())
}

fn run_surface(session: &Session, path: &str, scan_type: ScanType) -> Result<()> {
    let size = session.adapter.device_size(path)?;
    eprintln!("Scanning {} ({}, {} scan, read-only)…", path, fmt_bytes(size), scan_type.label());
    let r = surface::scan(path, size, scan_type)?;

    println!("Blocks read:  {} of {}", r.blocks_read, r.blocks_total);
    println!("Data read:    {}", fmt_bytes(r.bytes_read));
    println!("Read errors:  {}", r.error_count);
    for e in &r.errors {
        println!("  at offset {:>16}: {}", e.offset, e.detail);
    }
    if r.error_count as usize > r.errors.len() {
        println!("  … {} more", r.error_count as usize - r.errors.len());
    }
    println!("Slow blocks:  {}", r.slow_blocks);
    println!("Throughput:   {:.1} MB/s", r.mb_per_sec());
    println!("Direct I/O:   {}", if r.direct_io { "yes" } else { "no (page cache)" });
    println!("Result:       {}", if r.is_clean() { "PASSED" } else { "ERRORS FOUND" });
    Ok(())
}

fn run_check(session: &mut Session, path: &str) -> Result<()> {
    let (verdict, line) = match session.query(path) {
        Ok((_, record)) => {
            let a = Assessment::of(&record, session.cfg.alerts.spare_threshold_override);
            for alert in &a.alerts {
                println!("[{}] {}", alert.severity().label(), alert.description);
            }
            (a.verdict, format!("{} - {} ({})", a.verdict.label(), path, a.prediction.label()))
        }
        Err(e) => (HealthVerdict::Unknown, format!("UNKNOWN - {}: {:#}", path, e)),
    };
    println!("{}", line);
    std::process::exit(check_exit_code(verdict));
}

fn check_exit_code(verdict: HealthVerdict) -> i32 {
    match verdict {
        HealthVerdict::Ok                          => 0,
        HealthVerdict::Warning | HealthVerdict::Prefail => 1,
        HealthVerdict::Failing                     => 2,
        HealthVerdict::Unknown                     => 3,
    }
}

fn run_print_config(cfg: &Config) -> Result<()> {
    let path = Config::config_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    let cache_file = CacheStore::cache_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {}", path);
    println!("Cache:  {}", cache_file);
    println!();
    print!("{}", cfg.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn smart_json_takes_optional_output() {
        let cli = Cli::try_parse_from(["smartprobe", "--smart-json", "/dev/nvme0", "out.json"]).unwrap();
        assert_eq!(cli.smart_json, Some(vec!["/dev/nvme0".to_string(), "out.json".to_string()]));
        let cli = Cli::try_parse_from(["smartprobe", "--surface", "/dev/sda", "--type", "deep"]).unwrap();
        assert_eq!(cli.scan_type, ScanType::Deep);
    }

    #[test]
    fn check_codes_follow_nagios() {
        assert_eq!(check_exit_code(HealthVerdict::Ok), 0);
        assert_eq!(check_exit_code(HealthVerdict::Prefail), 1);
        assert_eq!(check_exit_code(HealthVerdict::Failing), 2);
        assert_eq!(check_exit_code(HealthVerdict::Unknown), 3);
    }
}
