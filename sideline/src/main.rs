use clap::Parser;
use log::*;
#[cfg(debug_assertions)]
use log4rs::append::console::ConsoleAppender;
use log4rs::{
    append::{
        console::Target,
        rolling_file::{
            RollingFileAppender,
            policy::compound::{
                CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
            },
        },
    },
    config::{Appender, Config as LogConfig, Logger, Root},
    encode::pattern::PatternEncoder,
};
use sideline_common::{
    clock::{MatchClock, format_elapsed},
    portal::PortalClient,
};
use std::{path::PathBuf, time::Duration};
use time::{OffsetDateTime, UtcOffset};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    time::sleep,
};

mod access;
mod config;
mod hub;
mod session;
mod submit;

use access::{AccessChallenge, ChallengeState, VerifyAttempt};
use config::Config;
use hub::HubClient;
use session::{SessionSync, SessionUpdate};
use submit::ActionSubmitter;

const APP_NAME: &str = "sideline";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Schedule id of the match to officiate
    schedule_id: u64,

    #[clap(long, short, action(clap::ArgAction::Count))]
    /// Increase the log verbosity
    verbose: u8,

    #[clap(long)]
    /// Don't require HTTPS to connect to the portal
    allow_http: bool,

    #[clap(long)]
    /// Directory within which log files will be placed, default is platform dependent
    log_location: Option<PathBuf>,

    #[clap(long, default_value = "5000000")]
    /// Max size in bytes that a log file is allowed to reach before being rolled over
    log_max_file_size: u64,

    #[clap(long, default_value = "3")]
    /// Number of archived logs to keep
    num_old_logs: u32,
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let log_base_path = args.log_location.clone().unwrap_or_else(|| {
        let mut path = directories::BaseDirs::new()
            .expect("Could not find a directory to store logs")
            .data_local_dir()
            .to_path_buf();
        path.push("sideline-logs");
        path
    });
    let mut log_path = log_base_path.clone();
    let mut archived_log_path = log_base_path;
    log_path.push("sideline-log.txt");
    archived_log_path.push("sideline-log-{}.txt.gz");

    // Only log to the console in debug mode
    #[cfg(debug_assertions)]
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{d} {h({l:5})} {M}] {m}{n}")))
        .build();

    // Setup the file log roller
    let roller = FixedWindowRoller::builder()
        .build(
            archived_log_path.as_os_str().to_str().unwrap(),
            args.num_old_logs,
        )
        .unwrap();
    let file_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(args.log_max_file_size)),
        Box::new(roller),
    );
    let file_appender = RollingFileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new("[{d} {l:5} {M}] {m}{n}")))
        .build(log_path, Box::new(file_policy))
        .unwrap();

    // Setup the logging from all locations to use `LevelFilter::Error`
    let root = Root::builder().appender("file_appender");
    #[cfg(debug_assertions)]
    let root = root.appender("console");
    let root = root.build(LevelFilter::Error);

    let log_config = LogConfig::builder()
        .appender(Appender::builder().build("file_appender", Box::new(file_appender)));

    #[cfg(debug_assertions)]
    let log_config = log_config.appender(Appender::builder().build("console", Box::new(console)));

    let log_config = log_config
        .logger(Logger::builder().build(APP_NAME, log_level))
        .build(root)
        .unwrap();

    log4rs::init_config(log_config).unwrap();
    log_panics::init();

    info!(
        "Reading config file from {:?}",
        confy::get_configuration_file_path(APP_NAME, None).unwrap()
    );

    let config: Config = match confy::load(APP_NAME, None) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file, overwriting with default. Error: {e}");
            let config = Config::default();
            confy::store(APP_NAME, None, &config).unwrap();
            config
        }
    };

    // Everything in the session is cooperative and non-blocking; one thread
    // is all it gets.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_session(args, config))
}

async fn run_session(args: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let schedule_id = args.schedule_id;
    let portal = PortalClient::new(
        &config.portal.url,
        None,
        !args.allow_http,
        Duration::from_secs(config.portal.timeout_secs),
    )?;
    let hub = HubClient::new(&config.hub.url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Match session for schedule {schedule_id}");

    let mut challenge = AccessChallenge::new();
    let mut needs_prompt = false;
    loop {
        match challenge.state() {
            ChallengeState::Granted => break,
            ChallengeState::Locked => {
                println!("All attempts used, the session stays closed.");
                return Err("verification attempts exhausted".into());
            }
            ChallengeState::Unrequested => {
                println!("Press Enter to request an access code.");
                if lines.next_line().await?.is_none() {
                    return Err("stdin closed".into());
                }
                match challenge.request_code(&portal, schedule_id).await {
                    Ok(()) => needs_prompt = true,
                    Err(e) => println!("Could not request a code, try again later. ({e})"),
                }
            }
            ChallengeState::CodeSent {
                code_length,
                countdown,
            } => {
                if needs_prompt {
                    println!(
                        "Enter the {code_length}-character code ({countdown}s remaining, {} attempts left):",
                        challenge.attempts_left()
                    );
                    needs_prompt = false;
                }
                tokio::select! {
                    _ = sleep(Duration::from_secs(1)) => challenge.tick(),
                    line = lines.next_line() => {
                        let Some(line) = line? else {
                            return Err("stdin closed".into());
                        };
                        match challenge.verify(&portal, schedule_id, line.trim()).await {
                            Ok(VerifyAttempt::Granted) => {}
                            Ok(VerifyAttempt::Rejected { attempts_left }) => {
                                println!("Wrong code, {attempts_left} attempts left.");
                                needs_prompt = true;
                            }
                            Ok(VerifyAttempt::Locked) => {}
                            Ok(VerifyAttempt::TryAgain) => {
                                println!("Could not verify the code, try again.");
                                needs_prompt = true;
                            }
                            Err(e) => {
                                println!("{e}");
                                needs_prompt = true;
                            }
                        }
                    }
                }
            }
            ChallengeState::Verifying { .. } => {}
        }
    }

    let info = portal.get_match_info(schedule_id).await?;
    let match_config = info.config;

    let team_names: Vec<&str> = match_config.teams.iter().map(|t| t.name.as_str()).collect();
    println!("\n{}", team_names.join(" vs "));
    println!("Score categories:");
    for category in &info.score_categories {
        println!(
            "  [{}] {} ({}, {} pts)",
            category.id, category.description, category.kind, category.points
        );
    }

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let today = OffsetDateTime::now_utc().to_offset(offset).date();
    let clock = MatchClock::from_config(&match_config, today, offset);

    let scheduled_length = match_config.end_time - match_config.start_time;
    if scheduled_length != clock.total_duration() {
        warn!(
            "The scheduled start/end window ({scheduled_length}) does not match the sum of the \
             half and break windows. The computed length will be used."
        );
    }

    let (clock_tx, mut clock_rx) = watch::channel(clock.state_at(OffsetDateTime::now_utc()));
    let clock_task = session::spawn_clock(clock, clock_tx);

    let (update_tx, mut update_rx) = mpsc::channel(8);
    let mut sync = SessionSync::new();
    sync.start(&portal, &hub, match_config.match_id, schedule_id, update_tx)
        .await;

    let submitter = ActionSubmitter::new(schedule_id);
    let mut last_phase = clock_rx.borrow().phase;
    println!(
        "\n== {} == Enter \"<category id> <team id>\" to submit an action, \"quit\" to leave.",
        last_phase
    );

    let mut clock_done = false;
    let mut updates_done = false;
    loop {
        tokio::select! {
            changed = clock_rx.changed(), if !clock_done => {
                if changed.is_ok() {
                    let state = *clock_rx.borrow_and_update();
                    if state.phase != last_phase {
                        last_phase = state.phase;
                        println!("== {} [{}] ==", state.phase, state.elapsed_display());
                    }
                } else {
                    clock_done = true;
                }
            }
            update = update_rx.recv(), if !updates_done => {
                match update {
                    Some(SessionUpdate::Totals(totals)) => {
                        let score = totals
                            .iter()
                            .map(|t| format!("{} {}", t.name, t.total))
                            .collect::<Vec<_>>()
                            .join("  -  ");
                        println!("Score: {score}");
                    }
                    Some(SessionUpdate::Actions(actions)) => {
                        println!("Action feed ({} entries):", actions.len());
                        for action in actions.iter().rev().take(5) {
                            println!(
                                "  [half {} {}] {} - {} ({})",
                                action.half_name,
                                format_elapsed(action.event_time),
                                action.team_name,
                                action.score_category_description,
                                action.status
                            );
                        }
                    }
                    None => updates_done = true,
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "quit" {
                    break;
                }
                let mut parts = line.split_whitespace();
                let category_id = parts.next().map(str::parse::<u64>);
                let team_id = parts.next().map(str::parse::<u64>);
                let (Some(Ok(category_id)), Some(Ok(team_id))) = (category_id, team_id) else {
                    println!("Expected \"<category id> <team id>\"");
                    continue;
                };
                let state = *clock_rx.borrow();
                match submitter.build(&match_config, &state, category_id, team_id) {
                    Ok(submission) => match submitter.submit(&portal, submission).await {
                        Ok(()) => println!("Action submitted, awaiting review."),
                        Err(e) => println!("Submission failed: {e}"),
                    },
                    Err(refusal) => println!("{refusal}"),
                }
            }
        }
    }

    sync.stop();
    clock_task.abort();
    Ok(())
}
