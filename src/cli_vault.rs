use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

mod cli_style;

use cli_style::{
    get_prompt, get_styles, print_command_echo, print_contender, print_error, print_goodbye,
    print_key_value, print_success, print_warning, print_welcome, Table,
};
use vault_ranker::catalog_store::{SqliteCatalogStore, Track};
use vault_ranker::ranking::{
    AddOutcome, HistoryWindow, Matchup, MatchupRequest, RankingEngine, RankingSettings,
    VoteRequest,
};
use vault_ranker::rating_store::SqliteRatingStore;
use vault_ranker::user::{SqliteUserStore, UserManager};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles=get_styles())]
struct CliArgs {
    /// Directory holding user.db, ranking.db and catalog.db. Defaults to the
    /// current directory.
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,
}

#[derive(Parser)]
#[command(styles=get_styles(),name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Creates a user with the given handle.
    AddUser { user_handle: String },

    /// Creates a password authentication for the given user.
    /// Fails if the user already has a password set.
    AddLogin {
        user_handle: String,
        password: String,
    },

    /// Change the password of a user, fails if no password was set.
    UpdateLogin {
        user_handle: String,
        password: String,
    },

    /// Deletes the password authentication for a given user.
    DeleteLogin { user_handle: String },

    /// Shows all user handles.
    UserHandles,

    /// Adds a track to the user's vault, storing its metadata.
    AddTrack {
        user_handle: String,
        track_id: String,
        title: String,
        artist_name: String,
        album_name: String,
        #[clap(long)]
        cover_url: Option<String>,
        #[clap(long, default_value_t = 0)]
        duration_ms: u64,
    },

    /// Removes a track from the user's vault. Its comparisons stay in the log.
    RemoveTrack {
        user_handle: String,
        track_id: String,
    },

    /// Shows the user's tracks, best rated first.
    Rankings { user_handle: String },

    /// Starts an interactive ranking session for the user.
    Duel {
        user_handle: String,
        /// Track to rank first.
        #[clap(long)]
        seed: Option<String>,
    },

    /// Shows the most recent comparisons of the user.
    History {
        user_handle: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },

    /// Rebuilds the user's ratings from the comparison log.
    Recompute { user_handle: String },

    /// Deletes the user's vault and comparison log.
    Reset { user_handle: String },

    /// Shows the path of the databases.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

struct VaultContext {
    user_manager: UserManager,
    engine: RankingEngine,
    db_dir: PathBuf,
}

impl VaultContext {
    fn open(db_dir: PathBuf) -> Result<Self> {
        let user_store = SqliteUserStore::new(db_dir.join("user.db"))?;
        let catalog = SqliteCatalogStore::new(db_dir.join("catalog.db"))?;
        let ratings = SqliteRatingStore::new(db_dir.join("ranking.db"))?;
        Ok(VaultContext {
            user_manager: UserManager::new(Arc::new(user_store)),
            engine: RankingEngine::new(
                Arc::new(catalog),
                Arc::new(ratings),
                RankingSettings::default(),
            ),
            db_dir,
        })
    }

    fn user_id(&self, user_handle: &str) -> Result<usize> {
        self.user_manager
            .get_user_id(user_handle)?
            .with_context(|| format!("User {} not found.", user_handle))
    }
}

fn print_matchup(matchup: &Matchup) {
    println!();
    if matchup.degraded {
        print_warning("The requested track couldn't be used, here's another pair.");
    }
    for (label, track) in [("1", &matchup.track_a), ("2", &matchup.track_b)] {
        print_contender(
            label,
            &track.title,
            &format!("{} · {}", track.artist_name, track.album_name),
        );
    }
}

/// Asks for the next matchup, and if the history window excludes everything
/// that's left, forgets the recently seen tracks and tries once more.
fn next_matchup(
    engine: &RankingEngine,
    user_id: usize,
    history: &mut HistoryWindow,
    seed: Option<String>,
) -> Result<Option<Matchup>> {
    let request = MatchupRequest {
        seed_track_id: seed.clone(),
        exclude_track_ids: history.excluded_track_ids(),
        exclude_pair_keys: history.excluded_pair_keys(),
    };
    if let Some(matchup) = engine.get_next_matchup(Some(user_id), &request)? {
        return Ok(Some(matchup));
    }
    if history.is_empty() {
        return Ok(None);
    }
    history.forget_tracks();
    let request = MatchupRequest {
        seed_track_id: seed,
        exclude_track_ids: history.excluded_track_ids(),
        exclude_pair_keys: history.excluded_pair_keys(),
    };
    Ok(engine.get_next_matchup(Some(user_id), &request)?)
}

fn run_duel(
    ctx: &VaultContext,
    user_id: usize,
    seed: Option<String>,
    rl: &mut Editor<MyHelper, FileHistory>,
) -> Result<()> {
    let mut history = HistoryWindow::new(ctx.engine.settings().history_size);
    let mut current = next_matchup(&ctx.engine, user_id, &mut history, seed.clone())?;
    let mut votes = 0;

    while let Some(matchup) = current.take() {
        history.push_matchup_except(&matchup, seed.as_deref());
        print_matchup(&matchup);

        let answer = match rl.readline("pick 1/2, s to skip, q to stop: ") {
            Ok(answer) => answer,
            Err(_) => break,
        };
        let (winner, loser) = match answer.trim() {
            "1" => (&matchup.track_a, &matchup.track_b),
            "2" => (&matchup.track_b, &matchup.track_a),
            "s" => {
                current = next_matchup(&ctx.engine, user_id, &mut history, seed.clone())?;
                continue;
            }
            "q" => break,
            _ => {
                print_warning("Please answer 1, 2, s or q.");
                current = Some(matchup);
                continue;
            }
        };

        let vote = VoteRequest {
            winner_id: winner.id.clone(),
            loser_id: loser.id.clone(),
            seed_id: seed.clone(),
            exclude_track_ids: history.excluded_track_ids(),
            exclude_pair_keys: history.excluded_pair_keys(),
        };
        let outcome = ctx
            .engine
            .submit_vote_and_fetch_next(Some(user_id), &vote)?;
        votes += 1;
        print_success(&format!(
            "{} {:.1} ({} games)  /  {} {:.1} ({} games)",
            winner.title,
            outcome.result.winner_rating,
            outcome.result.winner_games,
            loser.title,
            outcome.result.loser_rating,
            outcome.result.loser_games
        ));

        current = match outcome.next {
            Some(next) => Some(next),
            None => next_matchup(&ctx.engine, user_id, &mut history, seed.clone())?,
        };
    }

    if votes == 0 && history.is_empty() {
        bail!("The vault needs at least two tracks to rank.");
    }
    print_key_value("Votes recorded", &votes.to_string());
    Ok(())
}

fn execute_command(
    line: String,
    ctx: &VaultContext,
    rl: &mut Editor<MyHelper, FileHistory>,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            print_command_echo(&line);
            match cli.command {
                InnerCommand::Exit => return CommandExecutionResult::Exit,
                command => {
                    if let Err(err) = run_command(command, ctx, rl) {
                        return CommandExecutionResult::Error(format!("{:#}", err));
                    }
                }
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

fn run_command(
    command: InnerCommand,
    ctx: &VaultContext,
    rl: &mut Editor<MyHelper, FileHistory>,
) -> Result<()> {
    match command {
        InnerCommand::AddUser { user_handle } => {
            let user_id = ctx.user_manager.add_user(&user_handle)?;
            print_success(&format!("Created user {} ({})", user_handle, user_id));
        }
        InnerCommand::AddLogin {
            user_handle,
            password,
        } => {
            ctx.user_manager
                .create_password_credentials(&user_handle, &password)?;
            print_success("Password set.");
        }
        InnerCommand::UpdateLogin {
            user_handle,
            password,
        } => {
            ctx.user_manager
                .update_password_credentials(&user_handle, &password)?;
            print_success("Password updated.");
        }
        InnerCommand::DeleteLogin { user_handle } => {
            ctx.user_manager.delete_password_credentials(&user_handle)?;
            print_success("Password removed.");
        }
        InnerCommand::UserHandles => {
            for handle in ctx.user_manager.get_all_user_handles()? {
                println!("  {}", handle);
            }
        }
        InnerCommand::AddTrack {
            user_handle,
            track_id,
            title,
            artist_name,
            album_name,
            cover_url,
            duration_ms,
        } => {
            let user_id = ctx.user_id(&user_handle)?;
            let track = Track {
                id: track_id,
                title,
                artist_name,
                album_name,
                cover_url,
                duration_ms,
            };
            match ctx.engine.add_track_to_vault(Some(user_id), &track)? {
                AddOutcome::Added => print_success(&format!("Added {}", track.title)),
                AddOutcome::AlreadyInVault => {
                    print_warning(&format!("{} is already in the vault", track.title))
                }
            }
        }
        InnerCommand::RemoveTrack {
            user_handle,
            track_id,
        } => {
            let user_id = ctx.user_id(&user_handle)?;
            ctx.engine.remove_track_from_vault(Some(user_id), &track_id)?;
            print_success(&format!("Removed {}", track_id));
        }
        InnerCommand::Rankings { user_handle } => {
            let user_id = ctx.user_id(&user_handle)?;
            let rankings = ctx.engine.get_rankings(Some(user_id))?;
            let mut table = Table::new(&["#", "Track", "Artist", "Rating", "Games"]);
            for ranked in rankings {
                table.add_row(vec![
                    ranked.position.to_string(),
                    ranked.track.title,
                    ranked.track.artist_name,
                    format!("{:.1}", ranked.rating),
                    ranked.games.to_string(),
                ]);
            }
            table.print();
        }
        InnerCommand::Duel { user_handle, seed } => {
            let user_id = ctx.user_id(&user_handle)?;
            run_duel(ctx, user_id, seed, rl)?;
        }
        InnerCommand::History { user_handle, limit } => {
            let user_id = ctx.user_id(&user_handle)?;
            let mut table = Table::new(&["Winner", "Loser", "Decided at"]);
            for entry in ctx.engine.history(Some(user_id), limit)? {
                let decided_at = chrono::DateTime::from_timestamp(entry.decided_at as i64, 0)
                    .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| entry.decided_at.to_string());
                table.add_row(vec![entry.winner_id, entry.loser_id, decided_at]);
            }
            table.print();
        }
        InnerCommand::Recompute { user_handle } => {
            let user_id = ctx.user_id(&user_handle)?;
            let replayed = ctx.engine.recompute(Some(user_id))?;
            print_success(&format!("Replayed {} comparisons", replayed));
        }
        InnerCommand::Reset { user_handle } => {
            let user_id = ctx.user_id(&user_handle)?;
            let removed = ctx.engine.reset(Some(user_id))?;
            print_success(&format!("Removed {} tracks and their history", removed));
        }
        InnerCommand::Where => {
            print_key_value("Databases", &ctx.db_dir.display().to_string());
        }
        InnerCommand::Exit => {}
    }
    Ok(())
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let db_dir = match cli_args.db_dir {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    if !db_dir.is_dir() {
        bail!("{:?} is not a directory", db_dir);
    }
    let ctx = VaultContext::open(db_dir)?;

    print_welcome(&ctx.db_dir.display().to_string());

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(MyHelper::new()));

    loop {
        match rl.readline(&get_prompt()) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &ctx, &mut rl) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        print_error(&err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                print_error(&format!("{:?}", e));
                break;
            }
        }
    }
    print_goodbye();
    Ok(())
}
