use crate::output::{print_json, print_report};
use crate::settings::{connect, load_config};
use crate::target::{parse_tweet, parse_user};
use anyhow::Context;
use chainblock_core::io::atomic_write;
use chainblock_core::{
    blocklist, Actor, Config, FollowList, InactivePeriod, Purpose, QuotaLimiter, QuotaStatus,
    Reaction, SessionController, SessionId, SessionOptions, SessionRequest, SessionState,
    TargetSpec, Verb,
};
use clap::{Args, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RunArgs {
    #[command(subcommand)]
    target: RunTarget,

    /// chainblock, unchainblock or export
    #[arg(long, global = true, default_value = "chainblock")]
    purpose: Purpose,

    /// Export only: file to write the collected ids to, one per line
    #[arg(long, short = 'o', global = true)]
    output: Option<PathBuf>,

    /// Verb for candidates who follow you (skip, mute, block)
    #[arg(long, global = true)]
    my_followers: Option<Verb>,

    /// Verb for candidates you follow (skip, mute, block)
    #[arg(long, global = true)]
    my_followings: Option<Verb>,

    /// Verb for everyone else (skip, mute, block)
    #[arg(long, global = true)]
    others: Option<Verb>,

    /// Unchainblock only: verb for users who also block you (skip, unblock)
    #[arg(long, global = true)]
    mutual_blocked: Option<Verb>,

    /// Read full user pages instead of ids + lookup where possible
    #[arg(long, global = true)]
    quick: bool,

    /// Leave accounts alone that have not tweeted for this long (never, 1y, 2y, 3y)
    #[arg(long, global = true, default_value = "never")]
    skip_inactive: InactivePeriod,

    /// Block/unblock actions allowed (default: session.quota_max)
    #[arg(long, global = true)]
    quota_max: Option<u32>,

    /// Actions already spent in the current window
    #[arg(long, global = true, default_value_t = 0)]
    quota_used: u32,

    /// Start without asking for confirmation
    #[arg(long, short = 'y', global = true)]
    yes: bool,
}

#[derive(Subcommand)]
pub enum RunTarget {
    /// Everyone who follows USER
    Followers { user: String },
    /// Everyone USER follows
    Followings { user: String },
    /// Users who both follow and are followed by USER
    Mutuals { user: String },
    /// Everyone who retweeted TWEET
    Retweeters { tweet: String },
    /// Everyone who liked TWEET
    Likers { tweet: String },
    /// Accounts mentioned in TWEET
    Mentioned { tweet: String },
    /// Any mix of retweeters, likers and mentioned accounts of TWEET
    Tweet {
        tweet: String,
        #[arg(long)]
        retweeters: bool,
        #[arg(long)]
        likers: bool,
        #[arg(long)]
        mentioned: bool,
    },
    /// User ids read from import files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Users returned by a people search
    Search { query: String },
}

impl RunArgs {
    fn options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            my_followers: self.my_followers.unwrap_or(defaults.my_followers),
            my_followings: self.my_followings.unwrap_or(defaults.my_followings),
            others: self.others.unwrap_or(defaults.others),
            mutual_blocked: self.mutual_blocked.unwrap_or(defaults.mutual_blocked),
            quick_mode: self.quick,
            skip_inactive: self.skip_inactive,
        }
    }

    /// Where an export goes. Checked before anything touches the network.
    fn export_path(&self) -> anyhow::Result<Option<&Path>> {
        match (self.purpose, &self.output) {
            (Purpose::Export, None) => anyhow::bail!("--output is required with --purpose export"),
            (Purpose::Export, Some(path)) => Ok(Some(path.as_path())),
            (_, Some(_)) => anyhow::bail!("--output is only used with --purpose export"),
            (_, None) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    args.export_path()?;
    let config = load_config(config_path)?;
    let rt = super::runtime()?;
    rt.block_on(run_session(&config, args, json))
}

async fn run_session(config: &Config, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let (primary, pool) = connect(config).await?;
    let target = build_target(config, &primary, &args.target).await?;
    let description = describe(&args.target);

    let quota = QuotaLimiter::with_status(QuotaStatus {
        current: args.quota_used,
        max: args.quota_max.unwrap_or(config.session.quota_max),
    });
    let mut ctl = SessionController::new(primary, pool, quota, config);
    let request = SessionRequest {
        purpose: args.purpose,
        target,
        options: args.options(),
    };
    let id = ctl.create_session(request.clone())?;

    if !args.yes && !confirm(&ctl, &request, &description)? {
        ctl.cancel(id);
        eprintln!("Cancelled.");
        return Ok(());
    }
    ctl.start(id)?;

    let interrupted = tokio::select! {
        _ = ctl.wait(id) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("interrupted, stopping session");
        ctl.stop(id);
    }
    let mut report = ctl.wait(id).await.context("session disappeared")?;
    if report.state == SessionState::Paused {
        warn!(
            quota = ?ctl.quota().status(),
            "action quota exhausted, stopping; rerun later with --quota-used 0"
        );
        ctl.stop(id);
        report = ctl.wait(id).await.context("session disappeared")?;
    }
    if let Some(path) = args.export_path()? {
        write_export(&ctl, id, path)?;
    }

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    if report.state == SessionState::Error {
        anyhow::bail!(
            "session failed: {}",
            report.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Write whatever the session collected, even if it was interrupted.
fn write_export(ctl: &SessionController, id: SessionId, path: &Path) -> anyhow::Result<()> {
    let ids = ctl.exported_ids(id).unwrap_or_default();
    atomic_write(path, blocklist::render(&ids).as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("Exported {} ids to {}", ids.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Target resolution
// ---------------------------------------------------------------------------

async fn build_target(
    config: &Config,
    primary: &Actor,
    target: &RunTarget,
) -> anyhow::Result<TargetSpec> {
    let tweet_reaction = |tweet: &str, reactions: Vec<Reaction>| {
        parse_tweet(tweet).map(|tweet_id| TargetSpec::TweetReaction {
            tweet_id,
            reactions,
        })
    };

    match target {
        RunTarget::Followers { user } => follower_list(primary, user, FollowList::Followers).await,
        RunTarget::Followings { user } => {
            follower_list(primary, user, FollowList::Followings).await
        }
        RunTarget::Mutuals { user } => {
            follower_list(primary, user, FollowList::MutualFollowers).await
        }
        RunTarget::Retweeters { tweet } => tweet_reaction(tweet, vec![Reaction::Retweeted]),
        RunTarget::Likers { tweet } => tweet_reaction(tweet, vec![Reaction::Liked]),
        RunTarget::Mentioned { tweet } => tweet_reaction(tweet, vec![Reaction::Mentioned]),
        RunTarget::Tweet {
            tweet,
            retweeters,
            likers,
            mentioned,
        } => {
            let reactions = selected_reactions(*retweeters, *likers, *mentioned);
            if reactions.is_empty() {
                anyhow::bail!("pick at least one of --retweeters, --likers, --mentioned");
            }
            tweet_reaction(tweet, reactions)
        }
        RunTarget::Import { files } => {
            let list = blocklist::parse_files(files, config.session.max_user_limit)?;
            if list.duplicated > 0 || list.invalid > 0 {
                warn!(
                    duplicated = list.duplicated,
                    invalid = list.invalid,
                    "import files had unusable lines"
                );
            }
            Ok(TargetSpec::ImportedIds {
                ids: list.into_ids(),
            })
        }
        RunTarget::Search { query } => Ok(TargetSpec::SearchQuery {
            query: query.clone(),
        }),
    }
}

fn selected_reactions(retweeters: bool, likers: bool, mentioned: bool) -> Vec<Reaction> {
    [
        (retweeters, Reaction::Retweeted),
        (likers, Reaction::Liked),
        (mentioned, Reaction::Mentioned),
    ]
    .into_iter()
    .filter_map(|(wanted, reaction)| wanted.then_some(reaction))
    .collect()
}

/// Look the user up as the primary actor, so the record carries its view.
async fn follower_list(primary: &Actor, input: &str, list: FollowList) -> anyhow::Result<TargetSpec> {
    let name = parse_user(input)?;
    let user = primary
        .api
        .user_by_name(&name)
        .await
        .with_context(|| format!("failed to look up @{name}"))?;
    Ok(TargetSpec::FollowerList { user, list })
}

fn describe(target: &RunTarget) -> String {
    match target {
        RunTarget::Followers { user } => format!("followers of {user}"),
        RunTarget::Followings { user } => format!("followings of {user}"),
        RunTarget::Mutuals { user } => format!("mutual followers of {user}"),
        RunTarget::Retweeters { tweet } => format!("retweeters of {tweet}"),
        RunTarget::Likers { tweet } => format!("likers of {tweet}"),
        RunTarget::Mentioned { tweet } => format!("users mentioned in {tweet}"),
        RunTarget::Tweet { tweet, .. } => format!("users who reacted to {tweet}"),
        RunTarget::Import { files } => format!("ids from {} file(s)", files.len()),
        RunTarget::Search { query } => format!("search results for \"{query}\""),
    }
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

fn confirm(
    ctl: &SessionController,
    request: &SessionRequest,
    description: &str,
) -> anyhow::Result<bool> {
    let options = &request.options;
    let mut stderr = std::io::stderr().lock();
    writeln!(
        stderr,
        "{} {description} as @{}",
        request.purpose,
        ctl.primary().user.screen_name
    )?;
    if let TargetSpec::ImportedIds { ids } = &request.target {
        writeln!(stderr, "  {} unique ids", ids.len())?;
    }
    match request.purpose {
        Purpose::Chainblock => writeln!(
            stderr,
            "  my followers: {}, my followings: {}, others: {}",
            options.my_followers, options.my_followings, options.others
        )?,
        Purpose::Unchainblock => {
            writeln!(stderr, "  mutually blocked: {}", options.mutual_blocked)?
        }
        Purpose::Export => writeln!(stderr, "  nothing is blocked, ids are only collected")?,
    }
    if options.skip_inactive != InactivePeriod::Never {
        writeln!(
            stderr,
            "  skipping accounts inactive for {}",
            options.skip_inactive
        )?;
    }
    let quota = ctl.quota().status();
    writeln!(stderr, "  quota: {} of {} actions left", quota.remaining(), quota.max)?;
    write!(stderr, "Start? [y/N] ")?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
