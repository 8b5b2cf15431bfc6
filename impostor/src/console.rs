//! Line-oriented console for the game engine.
//!
//! Stands in for a chat transport: each input line names the chat and the
//! acting player, so several games and players can be driven from one
//! terminal or script.
//!
//! - `<chat> <player> <command> [args]` dispatches a game command
//! - Lines starting with `#` are console commands (catalog, status, quit)
//! - Output lines start with a `[TAG]`; vote timeouts arrive asynchronously
//!   as `[TIMEOUT]` blocks

use impostor_core::{
    Bucket, CatalogEdit, ChatId, Command, Effect, Engine, GameEvent, PlayerId, ScalingPolicy,
    SessionSnapshot, Team, Verdict,
};
use std::fmt::Write as _;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Errors from parsing a console line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected `<chat> <player> <command>`")]
    Incomplete,

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Game {
        chat: ChatId,
        actor: PlayerId,
        command: Command,
    },
    Status(ChatId),
    Games,
    WhereIs(PlayerId),
    Catalog(Bucket),
    Edit(CatalogEdit),
    Help,
    Quit,
}

pub async fn run(engine: Engine) -> Result<(), io::Error> {
    let printer = tokio::spawn(print_timeouts(engine.subscribe()));

    println!("=== Impostor Console ===");
    print_help();
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let input = match parse_line(line) {
            Ok(input) => input,
            Err(e) => {
                println!("[ERROR] {e}");
                continue;
            }
        };

        match input {
            Input::Quit => {
                println!("Goodbye!");
                break;
            }
            Input::Help => print_help(),
            Input::Game {
                chat,
                actor,
                command,
            } => match engine.dispatch(chat, actor, command).await {
                Ok(reply) => {
                    println!("[OK] chat {chat}");
                    for effect in &reply.effects {
                        println!("[EFFECT] {}", describe(effect, &reply.snapshot));
                    }
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Input::Status(chat) => match engine.snapshot(chat).await {
                Ok(snapshot) => print!("{}", status_block(&snapshot)),
                Err(e) => println!("[ERROR] {e}"),
            },
            Input::Games => {
                let chats = engine.registry().chats().await;
                let list: Vec<String> = chats.iter().map(ToString::to_string).collect();
                println!("[GAMES] {}", list.join(", "));
            }
            Input::WhereIs(player) => match engine.find_session_of(player).await {
                Some(chat) => println!("[WHEREIS] player {player} is in chat {chat}"),
                None => println!("[WHEREIS] player {player} is not in a game"),
            },
            Input::Catalog(bucket) => {
                println!("[CATALOG] {bucket}");
                for (i, task) in engine.catalog_list(bucket).await.iter().enumerate() {
                    println!("  {}. {task}", i + 1);
                }
            }
            Input::Edit(edit) => match engine.edit_catalog(edit).await {
                Ok(()) => println!("[CATALOG] updated"),
                Err(e) => println!("[ERROR] {e}"),
            },
        }
    }

    printer.abort();
    Ok(())
}

async fn print_timeouts(mut events: broadcast::Receiver<GameEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_timeout() => {
                println!("[TIMEOUT] chat {}", event.chat);
                for effect in &event.effects {
                    println!("[EFFECT] {}", describe(effect, &event.snapshot));
                }
            }
            Ok(event) => debug!(chat = %event.chat, "Command event"),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Console fell behind on game events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_help() {
    println!("[HELP]");
    println!("  <chat> <player> lobby              - Open a lobby");
    println!("  <chat> <player> apply <name>       - Ask to join");
    println!("  <chat> <player> approve <id>       - Admit an applicant");
    println!("  <chat> <player> reject <id>        - Turn an applicant away");
    println!("  <chat> <player> start [min] [fixed:N|pair:N]");
    println!("  <chat> <player> stop               - End the game");
    println!("  <chat> <player> vote               - Call an emergency vote");
    println!("  <chat> <player> ballot <id>        - Accuse a player");
    println!("  <chat> <player> done | skip        - Complete or skip the objective");
    println!("  <chat> <player> score+ | score- | votes+ | votes- | resend");
    println!("  #status <chat>  #games  #whereis <player>");
    println!("  #catalog [active|backlog]  #add <text>  #promote <n>  #demote <n>");
    println!("  #delete <active|backlog> <n>  #help  #quit");
}

// ============================================================================
// Parsing
// ============================================================================

pub fn parse_line(line: &str) -> Result<Input, ParseError> {
    if let Some(rest) = line.strip_prefix('#') {
        return parse_console(rest);
    }

    let Some((chat, rest)) = split_word(line) else {
        return Err(ParseError::Incomplete);
    };
    let Some((actor, rest)) = split_word(rest) else {
        return Err(ParseError::Incomplete);
    };
    let Some((word, rest)) = split_word(rest) else {
        return Err(ParseError::Incomplete);
    };
    let rest = rest.trim_end();

    Ok(Input::Game {
        chat: ChatId(number(chat)?),
        actor: PlayerId(number(actor)?),
        command: parse_command(word, rest)?,
    })
}

fn parse_command(word: &str, rest: &str) -> Result<Command, ParseError> {
    let command = match word {
        "lobby" => Command::CreateLobby,
        "apply" => {
            if rest.is_empty() {
                return Err(ParseError::Usage("apply <name>"));
            }
            Command::Apply {
                name: rest.to_string(),
            }
        }
        "approve" => Command::Approve {
            player: player_arg(rest, "approve <id>")?,
        },
        "reject" => Command::Reject {
            player: player_arg(rest, "reject <id>")?,
        },
        "start" => parse_start(rest)?,
        "stop" => Command::Stop,
        "vote" => Command::OpenVote,
        "ballot" => Command::CastBallot {
            accused: player_arg(rest, "ballot <id>")?,
        },
        "done" => Command::CompleteObjective,
        "skip" => Command::SkipObjective,
        "score+" => Command::ForceAddScore,
        "score-" => Command::ForceRemoveScore,
        "votes+" => Command::ForceAddVoteBudget,
        "votes-" => Command::ForceRemoveVoteBudget,
        "resend" => Command::ResendObjective,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

fn parse_start(rest: &str) -> Result<Command, ParseError> {
    let mut min_players = None;
    let mut scaling = None;
    for arg in rest.split_whitespace() {
        if let Some(n) = arg.strip_prefix("fixed:") {
            scaling = Some(ScalingPolicy::Fixed {
                impostors: number(n)?,
            });
        } else if let Some(n) = arg.strip_prefix("pair:") {
            scaling = Some(ScalingPolicy::Headcount {
                pair_threshold: number(n)?,
            });
        } else {
            min_players = Some(number(arg)?);
        }
    }
    Ok(Command::Start {
        min_players,
        scaling,
    })
}

/// Split off the first word, returning it with the untouched remainder.
fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    Some((&text[..end], text[end..].trim_start()))
}

fn parse_console(rest: &str) -> Result<Input, ParseError> {
    // Task text keeps its own spacing.
    if let Some(("add", text)) = split_word(rest) {
        let text = text.trim_end();
        if text.is_empty() {
            return Err(ParseError::Usage("#add <text>"));
        }
        return Ok(Input::Edit(CatalogEdit::AddToBacklog(text.to_string())));
    }

    let parts: Vec<&str> = rest.split_whitespace().collect();
    let input = match parts.as_slice() {
        ["quit"] | ["exit"] => Input::Quit,
        ["help"] => Input::Help,
        ["games"] => Input::Games,
        ["status", chat] => Input::Status(ChatId(number(chat)?)),
        ["status", ..] => return Err(ParseError::Usage("#status <chat>")),
        ["whereis", player] => Input::WhereIs(PlayerId(number(player)?)),
        ["whereis", ..] => return Err(ParseError::Usage("#whereis <player>")),
        ["catalog"] => Input::Catalog(Bucket::Active),
        ["catalog", bucket] => Input::Catalog(parse_bucket(bucket)?),
        ["promote", n] => Input::Edit(CatalogEdit::Promote(number(n)?)),
        ["demote", n] => Input::Edit(CatalogEdit::Demote(number(n)?)),
        ["delete", bucket, n] => Input::Edit(CatalogEdit::Delete {
            bucket: parse_bucket(bucket)?,
            index: number(n)?,
        }),
        [other, ..] => return Err(ParseError::UnknownCommand(format!("#{other}"))),
        [] => return Err(ParseError::UnknownCommand("#".to_string())),
    };
    Ok(input)
}

fn parse_bucket(word: &str) -> Result<Bucket, ParseError> {
    match word {
        "active" => Ok(Bucket::Active),
        "backlog" => Ok(Bucket::Backlog),
        _ => Err(ParseError::Usage("active | backlog")),
    }
}

fn player_arg(rest: &str, usage: &'static str) -> Result<PlayerId, ParseError> {
    match rest.split_whitespace().next() {
        Some(word) => Ok(PlayerId(number(word)?)),
        None => Err(ParseError::Usage(usage)),
    }
}

fn number<T: std::str::FromStr>(word: &str) -> Result<T, ParseError> {
    word.parse()
        .map_err(|_| ParseError::InvalidNumber(word.to_string()))
}

// ============================================================================
// Rendering
// ============================================================================

fn name(snapshot: &SessionSnapshot, id: PlayerId) -> String {
    match snapshot.player_name(id) {
        Some(name) => format!("{name} ({id})"),
        None => id.to_string(),
    }
}

fn names(snapshot: &SessionSnapshot, ids: &[PlayerId]) -> String {
    ids.iter()
        .map(|&id| name(snapshot, id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One-line description of an effect.
pub fn describe(effect: &Effect, snapshot: &SessionSnapshot) -> String {
    match effect {
        Effect::LobbyOpened => "Lobby opened".to_string(),
        Effect::Applied { player, name } => format!("{name} ({player}) applied"),
        Effect::Approved { player, players } => {
            format!("{} joined, {players} players", name(snapshot, *player))
        }
        Effect::Rejected { player } => format!("Application from {player} rejected"),
        Effect::Started {
            impostors,
            objectives_to_win,
            votes_total,
        } => format!(
            "Game started: {} impostor(s), {objectives_to_win} objectives to win, {votes_total} votes",
            impostors.len()
        ),
        Effect::ObjectiveIssued(objective) => {
            let skip = if objective.can_skip { " (skippable)" } else { "" };
            format!("Objective for the impostors: {}{skip}", objective.text)
        }
        Effect::ObjectivesExhausted => "No objectives left".to_string(),
        Effect::ObjectiveCompleted { completed, to_win } => {
            format!("Objective completed ({completed}/{to_win})")
        }
        Effect::ObjectiveSkipped { skips_left } => {
            format!("Objective skipped, {skips_left} skip(s) left")
        }
        Effect::VoteOpened {
            round,
            called_by,
            votes_used,
            votes_total,
            timeout,
        } => format!(
            "Vote {round} called by {} ({votes_used}/{votes_total}), closes in {}s",
            name(snapshot, *called_by),
            timeout.as_secs()
        ),
        Effect::BallotCast { voter, outstanding } => {
            format!("{} voted, {outstanding} to go", name(snapshot, *voter))
        }
        Effect::VoteResolved {
            round,
            verdict,
            votes_left,
        } => {
            let outcome = match verdict {
                Verdict::NoVotes => "nobody voted".to_string(),
                Verdict::Tie { accused, votes } => {
                    format!("tie between {} at {votes}", names(snapshot, accused))
                }
                Verdict::Unmasked { player, votes } => {
                    format!("{} unmasked with {votes} votes", name(snapshot, *player))
                }
                Verdict::Missed { player, votes } => {
                    format!("{} was crew ({votes} votes)", name(snapshot, *player))
                }
            };
            format!("Vote {round}: {outcome}, {votes_left} vote(s) left")
        }
        Effect::ScoreAdjusted { completed, to_win } => {
            format!("Score set to {completed}/{to_win}")
        }
        Effect::VoteBudgetAdjusted {
            votes_used,
            votes_total,
        } => format!("Vote budget now {votes_used}/{votes_total}"),
        Effect::GameEnded(ending) => {
            let result = match ending.winner() {
                Some(Team::Crew) => "Crew wins",
                Some(Team::Impostors) => "Impostors win",
                None => "Game stopped",
            };
            let mut line = format!(
                "{result}. Impostors were: {}",
                names(snapshot, &ending.impostors)
            );
            if !ending.completed_objectives.is_empty() {
                let _ = write!(line, ". Completed: {}", ending.completed_objectives.join("; "));
            }
            line
        }
    }
}

fn status_block(snapshot: &SessionSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[STATUS] chat {}", snapshot.chat);
    let _ = writeln!(out, "  Game: {} ({})", snapshot.session, snapshot.status);
    let players: Vec<PlayerId> = snapshot.players.iter().map(|p| p.id).collect();
    let _ = writeln!(out, "  Players: {}", names(snapshot, &players));
    if !snapshot.pending.is_empty() {
        let pending: Vec<String> = snapshot
            .pending
            .iter()
            .map(|p| format!("{} ({})", p.name, p.id))
            .collect();
        let _ = writeln!(out, "  Pending: {}", pending.join(", "));
    }
    if !snapshot.voted_out.is_empty() {
        let _ = writeln!(out, "  Voted out: {}", names(snapshot, &snapshot.voted_out));
    }
    let _ = writeln!(
        out,
        "  Objectives: {}/{} ({} left in pool, {} skip(s))",
        snapshot.objectives_completed,
        snapshot.objectives_to_win,
        snapshot.objectives_remaining,
        snapshot.skips_left
    );
    let _ = writeln!(out, "  Votes: {}/{}", snapshot.votes_used, snapshot.votes_total);
    if let Some(vote) = &snapshot.vote {
        let _ = writeln!(
            out,
            "  Open vote {}: {}/{} ballots",
            vote.round,
            vote.voters.len(),
            vote.eligible
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_game_command() {
        let input = parse_line("-100 7 ballot 3").unwrap();
        assert_eq!(
            input,
            Input::Game {
                chat: ChatId(-100),
                actor: PlayerId(7),
                command: Command::CastBallot {
                    accused: PlayerId(3)
                },
            }
        );
    }

    #[test]
    fn test_parse_apply_keeps_full_name() {
        let input = parse_line("1 2 apply Mary Jane").unwrap();
        assert!(matches!(
            input,
            Input::Game { command: Command::Apply { ref name }, .. } if name == "Mary Jane"
        ));
    }

    #[test]
    fn test_parse_start_options() {
        let Input::Game { command, .. } = parse_line("1 1 start 4 fixed:2").unwrap() else {
            panic!("expected a game command");
        };
        assert_eq!(
            command,
            Command::Start {
                min_players: Some(4),
                scaling: Some(ScalingPolicy::Fixed { impostors: 2 }),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_line("1 2"), Err(ParseError::Incomplete));
        assert_eq!(
            parse_line("x 2 vote"),
            Err(ParseError::InvalidNumber("x".to_string()))
        );
        assert_eq!(
            parse_line("1 2 dance"),
            Err(ParseError::UnknownCommand("dance".to_string()))
        );
        assert_eq!(parse_line("1 2 ballot"), Err(ParseError::Usage("ballot <id>")));
    }

    #[test]
    fn test_parse_tolerates_extra_spacing() {
        assert_eq!(
            parse_line("  -100   7  ballot  3 "),
            parse_line("-100 7 ballot 3")
        );
        assert!(matches!(
            parse_line("1  2  apply  Mary  Jane "),
            Ok(Input::Game { command: Command::Apply { ref name }, .. }) if name == "Mary  Jane"
        ));
        assert_eq!(
            parse_line("#add   tap  twice\tthen wave  "),
            Ok(Input::Edit(CatalogEdit::AddToBacklog(
                "tap  twice\tthen wave".to_string()
            )))
        );
        assert_eq!(parse_line("#add   "), Err(ParseError::Usage("#add <text>")));
        assert_eq!(parse_line("#additional"), Err(ParseError::UnknownCommand("#additional".to_string())));
    }

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_line("#quit"), Ok(Input::Quit));
        assert_eq!(parse_line("#status -5"), Ok(Input::Status(ChatId(-5))));
        assert_eq!(parse_line("#catalog backlog"), Ok(Input::Catalog(Bucket::Backlog)));
        assert_eq!(
            parse_line("#add hum a tune"),
            Ok(Input::Edit(CatalogEdit::AddToBacklog("hum a tune".to_string())))
        );
        assert_eq!(
            parse_line("#delete active 2"),
            Ok(Input::Edit(CatalogEdit::Delete {
                bucket: Bucket::Active,
                index: 2
            }))
        );
        assert!(parse_line("#fly").is_err());
    }
}
