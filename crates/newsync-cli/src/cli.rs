//! Command-line argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use newsync_core::ArticleFilters;

/// Default period for `watch` refreshes (in seconds)
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

pub const USAGE: &str = "\
Usage: newsync [OPTIONS] <COMMAND>

Commands:
  list                 List articles
  watch                List articles and print every update until Ctrl-C
  search <TEXT>        List articles matching TEXT
  article <ID>         Show one article
  bookmark <ID>        Toggle an article's bookmark in the listing
  categories           List categories
  sources              List sources
  stats                Show service statistics
  health               Check the service
  refresh              Ask the service to re-ingest its feeds
  config               Show the configuration
  config set-url <URL> Save the service base URL

Listing filters:
  --category <NAME>  --source <NAME>  --min-credibility <0..1>
  --page <N>  --per-page <N>  --search <TEXT>

Options:
  --api-url <URL>      Service base URL (overrides NEWSYNC_API_URL and config)
  --interval <SECS>    Refresh period for watch (default 60)
  --log-file <PATH>    Write logs to a daily rolling file instead of stderr
  --json               Print raw JSON
  -h, --help           Show this help";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Watch { interval: Duration },
    Article { id: String },
    Bookmark { id: String },
    Categories,
    Sources,
    Stats,
    Health,
    Refresh,
    ShowConfig,
    SetUrl { url: String },
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: Command,
    pub filters: ArticleFilters,
    pub api_url: Option<String>,
    pub log_file: Option<PathBuf>,
    pub json: bool,
}

fn value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("{} expects a number, got '{}'", flag, raw))
}

/// Parse arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut filters = ArticleFilters::default();
    let mut api_url = None;
    let mut log_file = None;
    let mut json = false;
    let mut interval = Duration::from_secs(DEFAULT_WATCH_INTERVAL_SECS);
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => positional.insert(0, "help"),
            "--json" => json = true,
            "--api-url" => api_url = Some(value(args, &mut i, arg)?.to_string()),
            "--log-file" => log_file = Some(PathBuf::from(value(args, &mut i, arg)?)),
            "--interval" => {
                let secs: u64 = number(value(args, &mut i, arg)?, arg)?;
                if secs == 0 {
                    bail!("--interval must be at least 1 second");
                }
                interval = Duration::from_secs(secs);
            }
            "--category" => filters.category = Some(value(args, &mut i, arg)?.to_string()),
            "--source" => filters.source = Some(value(args, &mut i, arg)?.to_string()),
            "--search" => filters.search = Some(value(args, &mut i, arg)?.to_string()),
            "--min-credibility" => {
                filters.min_credibility = Some(number(value(args, &mut i, arg)?, arg)?)
            }
            "--page" => filters.page = Some(number(value(args, &mut i, arg)?, arg)?),
            "--per-page" => filters.per_page = Some(number(value(args, &mut i, arg)?, arg)?),
            flag if flag.starts_with("--") => bail!("Unknown option '{}'", flag),
            _ => positional.push(arg),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        ["help", ..] => Command::Help,
        [] | ["list"] => Command::List,
        ["watch"] => Command::Watch { interval },
        ["search", words @ ..] if !words.is_empty() => {
            filters.search = Some(words.join(" "));
            Command::List
        }
        ["article", id] => Command::Article { id: id.to_string() },
        ["bookmark", id] => Command::Bookmark { id: id.to_string() },
        ["categories"] => Command::Categories,
        ["sources"] => Command::Sources,
        ["stats"] => Command::Stats,
        ["health"] => Command::Health,
        ["refresh"] => Command::Refresh,
        ["config"] => Command::ShowConfig,
        ["config", "set-url", url] => Command::SetUrl { url: url.to_string() },
        [name, ..] => bail!("Unknown or incomplete command '{}'", name),
    };

    Ok(Invocation {
        command,
        filters,
        api_url,
        log_file,
        json,
    })
}
