//! `gen` command: synthetic log lines for exercising a running `serve`.
//!
//! Each line is built from a device log format and a severity keyword, so the
//! output hits a wide spread of highlight rules.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, ValueEnum};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

const DEFAULT_TARGET: &str = ":9000";

const DEFAULT_FORMATS: [&str; 8] = [
    "syslog", "cisco", "routeros", "checkmk", "haproxy", "nginx", "postfix", "sshd",
];

const DEFAULT_LEVELS: [&str; 40] = [
    "trace", "debug", "info", "notice", "warn", "warning", "error", "err", "critical", "crit",
    "alert", "emerg", "ok", "success", "passed", "recovered", "resolved", "online", "fail",
    "failed", "down", "offline", "degraded", "timeout", "drop", "dropped", "deny", "denied",
    "block", "blocked", "allow", "allowed", "permit", "permitted", "issue", "problem",
    "incident", "restart", "reboot", "up",
];

/// Arguments of the `gen` command.
#[derive(Debug, Clone, Args)]
pub struct GenArgs {
    /// Comma-separated log formats
    #[arg(long, value_enum, value_delimiter = ',', default_values = DEFAULT_FORMATS)]
    pub formats: Vec<Format>,

    /// Comma-separated severities and keywords to mix into messages
    #[arg(long, value_delimiter = ',', default_values = DEFAULT_LEVELS)]
    pub levels: Vec<String>,

    /// Send interval (e.g. 500ms, 1s, 2m)
    #[arg(long, default_value = "1s", value_parser = parse_rate)]
    pub rate: Duration,

    /// Number of lines to send (0 = until interrupted)
    #[arg(long, default_value_t = 0)]
    pub count: u64,

    /// TCP target address (defaults to tcp.listen from the configuration)
    #[arg(long)]
    pub target: Option<String>,

    /// Channel prefix for every line (e.g. "#ops")
    #[arg(long)]
    pub channel: Option<String>,

    /// Pick formats at random instead of round-robin
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub randomize: bool,

    /// Sleep jitter as a fraction of the rate (0..1)
    #[arg(long, default_value_t = 0.2)]
    pub jitter: f64,
}

/// Log formats the generator can imitate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Linux syslog
    Syslog,
    /// Cisco IOS/ASA
    Cisco,
    /// MikroTik RouterOS
    Routeros,
    /// Checkmk notifications
    Checkmk,
    /// HAProxy access log
    Haproxy,
    /// nginx access and error log
    Nginx,
    /// Postfix mail log
    Postfix,
    /// OpenSSH auth log
    Sshd,
}

/// Rough meaning of a severity keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Good,
    Warn,
    Bad,
}

impl Tone {
    fn of(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "notice" | "ok" | "success" | "passed" | "recovered"
            | "resolved" | "online" | "up" | "allow" | "allowed" | "permit" | "permitted" => {
                Tone::Good
            }
            "warn" | "warning" | "issue" | "problem" | "degraded" | "timeout" | "restart"
            | "reboot" | "incident" => Tone::Warn,
            _ => Tone::Bad,
        }
    }
}

/// Run the generator until `count` lines were sent or Ctrl-C.
///
/// # Errors
///
/// Returns an error if the target cannot be reached or a write fails.
pub async fn run(args: GenArgs, configured_listen: &str) -> Result<()> {
    let target = resolve_target(args.target.as_deref(), configured_listen);
    let generator = Generator::new(&args)?;

    let mut stream = TcpStream::connect(&target)
        .await
        .with_context(|| format!("Failed to connect to {target}"))?;
    info!(
        target = %target,
        rate = ?args.rate,
        count = args.count,
        formats = ?args.formats,
        channel = args.channel.as_deref().unwrap_or(""),
        "Sending test data"
    );

    let mut sent = 0u64;
    loop {
        let (line, pause) = {
            let mut rng = rand::rng();
            (generator.line(&mut rng, sent), generator.pause(&mut rng))
        };
        stream
            .write_all(line.as_bytes())
            .await
            .context("Failed to send line")?;
        sent += 1;
        if args.count > 0 && sent >= args.count {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    stream.shutdown().await.ok();
    info!(sent, "Done sending test data");
    Ok(())
}

/// Address to send to; a bare `:port` means the local host.
fn resolve_target(explicit: Option<&str>, configured_listen: &str) -> String {
    let target = explicit
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| Some(configured_listen.trim()).filter(|t| !t.is_empty()))
        .unwrap_or(DEFAULT_TARGET);
    if target.starts_with(':') {
        format!("127.0.0.1{target}")
    } else {
        target.to_string()
    }
}

/// Parse an interval such as `250ms`, `1s`, `1.5s` or `2m`.
fn parse_rate(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else {
        return Err(format!("missing unit in {s:?} (use ms, s or m)"));
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid interval: {s:?}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid interval: {s:?}"));
    }
    Ok(Duration::from_secs_f64(value * scale))
}

struct Generator {
    formats: Vec<Format>,
    levels: Vec<String>,
    channel: Option<String>,
    randomize: bool,
    rate: Duration,
    jitter: f64,
}

impl Generator {
    fn new(args: &GenArgs) -> Result<Self> {
        let levels: Vec<String> = args
            .levels
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if args.formats.is_empty() {
            bail!("--formats must name at least one format");
        }
        Ok(Self {
            formats: args.formats.clone(),
            levels: if levels.is_empty() {
                DEFAULT_LEVELS.iter().map(|l| l.to_string()).collect()
            } else {
                levels
            },
            channel: args
                .channel
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            randomize: args.randomize,
            rate: args.rate,
            jitter: args.jitter.clamp(0.0, 1.0),
        })
    }

    /// The `seq`-th line, newline-terminated.
    fn line<R: Rng + ?Sized>(&self, rng: &mut R, seq: u64) -> String {
        let format = if self.randomize {
            self.formats.choose(rng).copied()
        } else {
            let index = (seq % self.formats.len() as u64) as usize;
            self.formats.get(index).copied()
        }
        .unwrap_or(Format::Syslog);
        let level = self.levels.choose(rng).map_or("info", String::as_str);

        let mut line = format.generate(rng, level);
        if let Some(channel) = &self.channel {
            line = format!("{channel} {line}");
        }
        line.push('\n');
        line
    }

    /// Pause before the next line: the rate, give or take the jitter.
    fn pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter <= 0.0 {
            return self.rate;
        }
        let delta = self.rate.mul_f64(self.jitter);
        let spread = rng.random_range(0.0..=2.0);
        let pause = self.rate.saturating_sub(delta) + delta.mul_f64(spread);
        pause.max(Duration::from_millis(1))
    }
}

impl Format {
    fn generate<R: Rng + ?Sized>(self, rng: &mut R, level: &str) -> String {
        match self {
            Format::Syslog => syslog(rng, level),
            Format::Cisco => cisco(rng, level),
            Format::Routeros => routeros(rng, level),
            Format::Checkmk => checkmk(rng, level),
            Format::Haproxy => haproxy(rng, level),
            Format::Nginx => nginx(rng, level),
            Format::Postfix => postfix(rng, level),
            Format::Sshd => sshd(rng, level),
        }
    }
}

fn pick<R: Rng + ?Sized, T: Copy + Default>(rng: &mut R, items: &[T]) -> T {
    items.choose(rng).copied().unwrap_or_default()
}

fn ipv4<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.random_range(1..=223),
        rng.random_range(0..=254),
        rng.random_range(0..=254),
        rng.random_range(1..=254)
    )
}

fn port<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.random_range(1024..=65535)
}

fn pid<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.random_range(1000..10000)
}

fn mac<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut b: [u8; 6] = rng.random();
    b[0] &= 0xfe;
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        b[0], b[1], b[2], b[3], b[4], b[5]
    )
}

fn iface<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, &["ether1", "ether2", "vlan10", "vlan20", "bond0", "ge-0/0/1", "Gi0/1"])
}

fn user<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, &["root", "deploy", "www-data", "admin", "svc-check", "backup"])
}

fn domain<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    pick(rng, &["example.com", "example.org", "corp.local", "internal.net"])
}

fn url<R: Rng + ?Sized>(rng: &mut R) -> String {
    let host = pick(rng, &["web01", "api", "cdn"]);
    let path = pick(rng, &["/index.html", "/healthz", "/login", "/api/v1/items", "/status"]);
    format!("https://{host}.{}{path}", domain(rng))
}

fn millis<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    pick(rng, &[2, 5, 12, 20, 37, 50, 73, 120, 250, 480, 900, 1500])
}

fn syslog<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["syslog01", "web01", "db01", "proxy02"]);
    let prog = pick(rng, &["sudo", "sshd", "systemd", "kernel", "nginx", "cron", "rsyslogd"]);

    if prog == "sudo" && rng.random_ratio(1, 5) {
        let user = user(rng);
        return format!(
            "{host}: sudo: {user} : TTY=pts/0 ; PWD=/home/{user} ; USER=root ; \
             COMMAND=/usr/bin/systemctl restart rsyslog.service"
        );
    }

    let template = match Tone::of(level) {
        Tone::Good => pick(
            rng,
            &[
                "service {unit} started successfully",
                "interface {if} is up",
                "rotation complete for /var/log/syslog",
                "CPU load normal",
                "unit {unit}: state is active (running)",
                "job completed without error",
            ],
        ),
        Tone::Warn => pick(
            rng,
            &[
                "disk usage high on /var: 92%",
                "unit {unit} failed to start, retrying",
                "interface {if} is down",
                "possible brute force from {ip}",
                "connection reset by peer",
                "request timed out after {ms}ms",
            ],
        ),
        Tone::Bad => pick(
            rng,
            &[
                "BUG: soft lockup on CPU 0",
                "segfault at 0000 ip 0000 sp 0000 error 4 in {unit}",
                "OOM killer invoked",
                "filesystem read-only, remount required",
                "panic: fatal exception",
                "RAID array degraded",
            ],
        ),
    };
    let message = template
        .replace("{unit}", pick(rng, &["rsyslog.service", "nginx", "postgres"]))
        .replace("{if}", iface(rng))
        .replace("{ip}", &ipv4(rng))
        .replace("{ms}", &millis(rng).to_string());

    format!(
        "{host} {prog}[{}]: {}: {message}",
        pid(rng),
        level.to_ascii_uppercase()
    )
}

fn cisco<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["ios-rtr01", "asa-fw01", "cat9300-1"]);
    let iface = iface(rng);
    let (src, dst) = (ipv4(rng), ipv4(rng));
    let (sport, dport) = (port(rng), pick(rng, &[22u16, 80, 443, 3389]));
    let vlan = pick(rng, &[1u16, 10, 20, 100, 200, 4094]);

    match (Tone::of(level), rng.random_range(0..4)) {
        (Tone::Good, 0) => format!("{host}: %LINK-3-UPDOWN: Interface {iface}, changed state to up"),
        (Tone::Good, 1) => format!(
            "{host}: %LINEPROTO-5-UPDOWN: Line protocol on Interface {iface}, changed state to up"
        ),
        (Tone::Good, 2) => format!("{host}: %SYS-5-CONFIG_I: Configured from console by vty0"),
        (Tone::Good, _) => format!("{host}: %SPAN-4-PORTUP: Port {iface} forward enabled"),
        (Tone::Warn, 0) => {
            format!("{host}: %LINK-3-UPDOWN: Interface {iface}, changed state to down")
        }
        (Tone::Warn, 1) => format!(
            "{host}: %PM-4-ERR_DISABLE: link-flap error detected on {iface}, \
             putting {iface} in err-disable state"
        ),
        (Tone::Warn, 2) => format!(
            "{host}: %SEC-6-IPACCESSLOGP: list ACL-WARN denied tcp {src}:{sport} -> {dst}:{dport} flags RST"
        ),
        (Tone::Warn, _) => {
            format!("{host}: %STP-5-ROOTCHANGE: Root switch for VLAN {vlan} has changed")
        }
        (Tone::Bad, 0) => format!(
            "{host}: %SEC-6-IPACCESSLOGP: list ACL-DROP dropped tcp {src}:{sport} -> {dst}:{dport} flags SYN"
        ),
        (Tone::Bad, 1) => format!(
            "{host}: %SPANTREE-2-LOOPGUARD_BLOCK: Loop guard blocking port {iface} on VLAN{vlan:04}."
        ),
        (Tone::Bad, 2) => format!(
            "{host}: %DOT1X-5-FAIL: Authentication failed on {iface} for client {}",
            mac(rng)
        ),
        (Tone::Bad, _) => format!(
            "{host}: %BGP-3-NOTIFICATION: {src} ASN{} neighbor reset (timeout)",
            pick(rng, &[64512u32, 64513, 65001, 65010, 65100])
        ),
    }
}

fn routeros<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["fw2", "ros-core", "edge01"]);
    let (in_if, out_if) = (iface(rng), iface(rng));
    let (src, dst) = (ipv4(rng), ipv4(rng));
    let (sport, dport) = (port(rng), pick(rng, &[53u16, 80, 123, 443]));
    let proto = pick(rng, &["tcp", "udp", "icmp"]);
    let mac = mac(rng);

    match (Tone::of(level), rng.random_range(0..3)) {
        (Tone::Good, 0) => format!(
            "{host}: accept output: in:{in_if} out:{out_if}, proto {proto}, \
             {src}:{sport}->{dst}:{dport}, mac:{mac}, hop=64"
        ),
        (Tone::Good, 1) => format!("{host}: interface {in_if} link up"),
        (Tone::Good, _) => format!("{host}: dhcp: lease granted {src} to {mac}"),
        (Tone::Warn, 0) => format!(
            "{host}: drop input: in:{in_if} out:{out_if}, proto {proto}, \
             {src}:{sport}->{dst}:{dport}, mac:{mac}, flag=RST"
        ),
        (Tone::Warn, 1) => format!("{host}: interface {in_if} link down"),
        (Tone::Warn, _) => format!("{host}: dhcp: request timeout for {src}"),
        (Tone::Bad, 0) => format!(
            "{host}: drop forward: in:{in_if} out:{out_if}, proto {proto}, \
             {src}:{sport}->{dst}:{dport}, mac:{mac}, flag=SYN"
        ),
        (Tone::Bad, 1) => format!("{host}: disk error: write failed on nand"),
        (Tone::Bad, _) => format!("{host}: firewall: deny rule matched from {src} to {dst}"),
    }
}

fn checkmk<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["db01", "web01", "cache02", "mq01"]);
    let service = pick(
        rng,
        &["CPU load", "Filesystem /", "Memory", "Interface eth0", "NTP", "Ping"],
    );
    let (state, detail) = match (Tone::of(level), service) {
        (Tone::Good, "CPU load") => ("OK", "1 min load 0.23 at 4 CPUs"),
        (Tone::Good, "Filesystem /" | "Memory") => ("OK", "35% used"),
        (Tone::Good, "Interface eth0") => ("OK", "link up"),
        (Tone::Good, "NTP") => ("OK", "offset 0.2ms"),
        (Tone::Good, _) => ("OK", "all checks passed"),
        (Tone::Warn, "CPU load") => ("WARN", "1 min load 3.7 at 4 CPUs"),
        (Tone::Warn, "Filesystem /" | "Memory") => ("WARN", "88% used"),
        (Tone::Warn, "Interface eth0") => ("WARN", "errors detected"),
        (Tone::Warn, "NTP") => ("WARN", "offset 89ms"),
        (Tone::Warn, _) => ("WARN", "response time high"),
        (Tone::Bad, "CPU load") => ("CRIT", "1 min load 7.9 at 4 CPUs"),
        (Tone::Bad, "Filesystem /" | "Memory") => ("CRIT", "97% used"),
        (Tone::Bad, "Interface eth0") => ("CRIT", "link down"),
        (Tone::Bad, "NTP") => ("CRIT", "unsynchronized"),
        (Tone::Bad, _) => ("CRIT", "service not responding"),
    };
    format!(
        "Check_MK[{}]: {host};SERVICE {service};{state} - {detail}",
        rng.random_range(10000..100000)
    )
}

fn haproxy<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let frontend = pick(rng, &["frontend_www", "api_fe"]);
    let backend = pick(rng, &["backend_www", "api_be"]);
    let server = pick(rng, &["web01", "web02", "api01"]);
    let verb = pick(rng, &["GET", "POST", "PUT", "DELETE"]);
    let ms = millis(rng);
    let url = url(rng);
    match Tone::of(level) {
        Tone::Good => format!(
            "haproxy: {frontend} {backend}/{server} {} {ms}ms {verb} {url}",
            pick(rng, &[200u16, 201, 204, 301, 302, 304])
        ),
        Tone::Warn => format!(
            "haproxy: {frontend} {backend}/{server} {} {ms}ms RETRY {verb} {url}",
            pick(rng, &[408u16, 429, 500])
        ),
        Tone::Bad => format!("haproxy: {frontend} {backend}/{server} 503 {ms}ms DOWN {verb} {url}"),
    }
}

fn nginx<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["nginx01", "nginx02"]);
    let url = url(rng);
    match Tone::of(level) {
        Tone::Good => format!(
            "{host}: access: {url} {} {}ms",
            pick(rng, &[200u16, 201, 204, 301, 302, 404]),
            millis(rng)
        ),
        Tone::Warn => format!(
            "{host}: error: upstream timed out (110: Connection timed out) \
             while reading response header from upstream, url: {url}"
        ),
        Tone::Bad => format!(
            "{host}: error: connect() failed (111: Connection refused) \
             while connecting to upstream, url: {url}"
        ),
    }
}

fn postfix<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["mx1", "mx2"]);
    let pid = pid(rng);
    let queue_id = format!("{:X}", rng.random_range(0x10_0000..0x20_0000));
    let relay = format!("mx.{}", domain(rng));
    let ip = ipv4(rng);
    match Tone::of(level) {
        Tone::Good => format!(
            "{host} postfix/qmgr[{pid}]: {queue_id}: from=<noreply@{}>, size=1234, nrcpt=1 (queue active)",
            domain(rng)
        ),
        Tone::Warn => format!(
            "{host} postfix/smtp[{pid}]: {queue_id}: to=<user@{}>, relay={relay}[{ip}]:25, \
             delay=2.3, dsn=4.2.0, status=deferred (host {relay} said: 450 try again later)",
            domain(rng)
        ),
        Tone::Bad => format!(
            "{host} postfix/smtp[{pid}]: {queue_id}: to=<user@{}>, relay={relay}[{ip}]:25, \
             delay=0.5, dsn=5.7.1, status=bounced (554 5.7.1 relay access denied)",
            domain(rng)
        ),
    }
}

fn sshd<R: Rng + ?Sized>(rng: &mut R, level: &str) -> String {
    let host = pick(rng, &["auth01", "web01"]);
    let pid = pid(rng);
    let user = user(rng);
    let ip = ipv4(rng);
    let port = port(rng);
    match Tone::of(level) {
        Tone::Good => {
            format!("{host} sshd[{pid}]: Accepted publickey for {user} from {ip} port {port} ssh2")
        }
        Tone::Warn => {
            format!("{host} sshd[{pid}]: Failed password for {user} from {ip} port {port} ssh2")
        }
        Tone::Bad => format!(
            "{host} sshd[{pid}]: Disconnecting {user} {ip} port {port}: \
             Too many authentication failures"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: GenArgs,
    }

    fn args(argv: &[&str]) -> GenArgs {
        Cli::try_parse_from(std::iter::once("gen").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_default_args() {
        let args = args(&[]);
        assert_eq!(args.formats.len(), DEFAULT_FORMATS.len());
        assert_eq!(args.levels.len(), DEFAULT_LEVELS.len());
        assert_eq!(args.rate, Duration::from_secs(1));
        assert_eq!(args.count, 0);
        assert!(args.randomize);
        assert!((args.jitter - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_args() {
        let args = args(&[
            "--formats",
            "sshd,haproxy",
            "--levels",
            "error",
            "--rate",
            "250ms",
            "--randomize",
            "false",
            "--channel",
            "#ops",
        ]);
        assert_eq!(args.formats, vec![Format::Sshd, Format::Haproxy]);
        assert_eq!(args.levels, vec!["error"]);
        assert_eq!(args.rate, Duration::from_millis(250));
        assert!(!args.randomize);
        assert_eq!(args.channel.as_deref(), Some("#ops"));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["gen", "--formats", "syslog,windows"]).is_err());
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target(None, ""), "127.0.0.1:9000");
        assert_eq!(resolve_target(None, ":9100"), "127.0.0.1:9100");
        assert_eq!(resolve_target(None, "10.0.0.5:9000"), "10.0.0.5:9000");
        assert_eq!(resolve_target(Some(" :7000 "), ":9100"), "127.0.0.1:7000");
        assert_eq!(resolve_target(Some(""), "host:1"), "host:1");
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_rate("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_rate("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_rate("1m"), Ok(Duration::from_secs(60)));
        assert!(parse_rate("10").is_err());
        assert!(parse_rate("-1s").is_err());
        assert!(parse_rate("fast").is_err());
    }

    #[test]
    fn test_tone() {
        assert_eq!(Tone::of("OK"), Tone::Good);
        assert_eq!(Tone::of("degraded"), Tone::Warn);
        assert_eq!(Tone::of("emerg"), Tone::Bad);
        assert_eq!(Tone::of("something-else"), Tone::Bad);
    }

    #[test]
    fn test_round_robin_lines() {
        let generator = Generator::new(&args(&[
            "--formats",
            "haproxy,sshd",
            "--randomize",
            "false",
            "--channel",
            "#ops",
        ]))
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let first = generator.line(&mut rng, 0);
        let second = generator.line(&mut rng, 1);
        let third = generator.line(&mut rng, 2);
        assert!(first.starts_with("#ops haproxy: "), "{first}");
        assert!(second.starts_with("#ops ") && second.contains(" sshd["), "{second}");
        assert!(third.starts_with("#ops haproxy: "), "{third}");
        assert!(first.ends_with('\n'));
    }

    #[test]
    fn test_every_format_and_tone_produces_one_line() {
        let mut rng = StdRng::seed_from_u64(42);
        for format in Format::value_variants() {
            for level in ["info", "warning", "critical"] {
                for _ in 0..20 {
                    let line = format.generate(&mut rng, level);
                    assert!(!line.is_empty());
                    assert!(!line.contains(['\n', '\r']), "{format:?}: {line}");
                    assert!(!line.contains('{'), "unfilled placeholder: {line}");
                }
            }
        }
    }

    #[test]
    fn test_syslog_uses_level_tag() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let line = syslog(&mut rng, "warning");
            assert!(line.contains(": WARNING: ") || line.contains(": sudo: "), "{line}");
        }
    }

    #[test]
    fn test_pause_stays_within_jitter() {
        let generator = Generator::new(&args(&["--rate", "1s", "--jitter", "5"])).unwrap();
        assert!((generator.jitter - 1.0).abs() < f64::EPSILON);

        let generator = Generator::new(&args(&["--rate", "1s"])).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let pause = generator.pause(&mut rng);
            assert!(pause >= Duration::from_millis(800) && pause <= Duration::from_millis(1200));
        }

        let steady = Generator::new(&args(&["--rate", "1s", "--jitter", "0"])).unwrap();
        assert_eq!(steady.pause(&mut rng), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sends_count_lines() {
        use tokio::io::AsyncBufReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let sender = tokio::spawn(run(
            args(&["--count", "3", "--rate", "1ms", "--target", addr.as_str()]),
            "",
        ));

        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = tokio::io::BufReader::new(stream).lines();
        let mut received = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            received.push(line);
        }
        sender.await.unwrap().unwrap();
        assert_eq!(received.len(), 3);
    }
}
