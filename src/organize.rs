//! Spreadsheet-oriented views of a [`GameDataEnvelope`]
//!
//! Nothing here fails: a field that cannot be found is `None`, a list that
//! cannot be built is empty.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::extract::GameDataEnvelope;

/// Where the game object sits inside the structured payload
const GAME_POINTERS: &[&str] = &[
    "/game",
    "/props/pageProps/game",
    "/props/pageProps/gameData/game",
    "/props/pageProps/initialState/game",
    "/data/game",
];

/// Global a move-mirroring script leaves behind
const MIRRORED_MOVES_GLOBAL: &str = "__extMoves";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub game_id: Option<String>,
    pub url: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
    pub winner: Option<String>,
    pub termination: Option<String>,
    pub time_control: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub color: String,
    pub username: Option<String>,
    pub rating: Option<i64>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRow {
    /// 1-based half-move index
    pub ply: usize,
    pub move_number: usize,
    pub color: String,
    pub san: String,
    /// Remaining clock in seconds after the move
    pub clock: Option<f64>,
    pub evaluation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningInfo {
    pub eco: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTime {
    pub ply: usize,
    pub color: String,
    pub clock: f64,
    /// Seconds spent on the move, increment included
    pub spent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingInfo {
    pub base_seconds: Option<f64>,
    pub increment_seconds: Option<f64>,
    pub moves: Vec<MoveTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizedGame {
    pub basic: BasicInfo,
    pub players: Vec<PlayerInfo>,
    pub moves: Vec<MoveRow>,
    pub opening: OpeningInfo,
    pub timing: TimingInfo,
}

/// Every view at once
pub fn organize(envelope: &GameDataEnvelope) -> OrganizedGame {
    OrganizedGame {
        basic: basic_info(envelope),
        players: players(envelope),
        moves: moves(envelope),
        opening: opening(envelope),
        timing: timing(envelope),
    }
}

pub fn basic_info(envelope: &GameDataEnvelope) -> BasicInfo {
    let game = game_object(envelope);
    let headers = pgn_headers(envelope);

    let result = header(&headers, "Result");
    let winner = game
        .and_then(|g| g.get("winner"))
        .and_then(scalar_string)
        .or_else(|| result.as_deref().and_then(winner_from_result));

    BasicInfo {
        game_id: game.and_then(|g| g.get("id")).and_then(scalar_string),
        url: envelope.computed.url.clone(),
        white: username(game, &headers, "white"),
        black: username(game, &headers, "black"),
        result,
        winner,
        termination: header(&headers, "Termination"),
        time_control: time_control(game, &headers),
        date: header(&headers, "Date"),
    }
}

pub fn players(envelope: &GameDataEnvelope) -> Vec<PlayerInfo> {
    let game = game_object(envelope);
    let headers = pgn_headers(envelope);

    ["white", "black"]
        .into_iter()
        .map(|color| {
            let side = player_object(game, color);
            let elo_key = if color == "white" { "WhiteElo" } else { "BlackElo" };
            PlayerInfo {
                color: color.to_string(),
                username: username(game, &headers, color),
                rating: header(&headers, elo_key)
                    .and_then(|r| r.parse().ok())
                    .or_else(|| side.and_then(|s| s.get("rating")).and_then(Value::as_i64)),
                country: side.and_then(|s| s.get("country")).and_then(scalar_string),
            }
        })
        .collect()
}

/// DOM move tokens joined with clocks and evaluations by index
pub fn moves(envelope: &GameDataEnvelope) -> Vec<MoveRow> {
    let clocks = clock_seconds(envelope);
    let evaluations: Vec<String> = envelope
        .dom
        .analysis_markers
        .iter()
        .flatten()
        .map(|m| m.attribute_value.clone().unwrap_or_else(|| m.text.clone()))
        .collect();

    move_tokens(envelope)
        .into_iter()
        .enumerate()
        .map(|(i, san)| MoveRow {
            ply: i + 1,
            move_number: i / 2 + 1,
            color: side_to_move(i).to_string(),
            san,
            clock: clocks.get(i).copied(),
            evaluation: evaluations.get(i).cloned(),
        })
        .collect()
}

pub fn opening(envelope: &GameDataEnvelope) -> OpeningInfo {
    let headers = pgn_headers(envelope);
    let url = header(&headers, "ECOUrl");
    let name = url
        .as_deref()
        .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
        .filter(|slug| !slug.is_empty())
        .map(|slug| slug.replace('-', " "));

    OpeningInfo {
        eco: header(&headers, "ECO"),
        name,
        url,
    }
}

/// Per-move time spent, from the clock after each move
pub fn timing(envelope: &GameDataEnvelope) -> TimingInfo {
    let game = game_object(envelope);
    let headers = pgn_headers(envelope);
    let control = time_control(game, &headers);
    let (base, increment) = match control.as_deref().and_then(parse_time_control) {
        Some((base, increment)) => (Some(base), Some(increment)),
        None => (None, None),
    };

    let clocks = clock_seconds(envelope);
    let moves = clocks
        .iter()
        .enumerate()
        .map(|(i, &clock)| {
            let previous = if i >= 2 { Some(clocks[i - 2]) } else { base };
            let spent = previous.map(|prev| round_tenths(prev - clock + increment.unwrap_or(0.0)));
            MoveTime {
                ply: i + 1,
                color: side_to_move(i).to_string(),
                clock,
                spent,
            }
        })
        .collect();

    TimingInfo {
        base_seconds: base,
        increment_seconds: increment,
        moves,
    }
}

// =============================================================================
// Payload lookup
// =============================================================================

fn game_object(envelope: &GameDataEnvelope) -> Option<&Value> {
    let payload = envelope.structured_payload.as_ref()?;
    GAME_POINTERS
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .find(|v| v.is_object())
}

/// PGN headers from the game object, else from any global that carries them
fn pgn_headers(envelope: &GameDataEnvelope) -> Map<String, Value> {
    let from_game = game_object(envelope)
        .and_then(|g| g.get("pgnHeaders"))
        .and_then(Value::as_object);

    let from_globals = || {
        envelope.globals.values().find_map(|v| {
            v.get("pgnHeaders")
                .and_then(Value::as_object)
                .or_else(|| v.as_object().filter(|o| o.contains_key("White")))
        })
    };

    from_game.or_else(from_globals).cloned().unwrap_or_default()
}

fn header(headers: &Map<String, Value>, key: &str) -> Option<String> {
    headers.get(key).and_then(scalar_string)
}

fn player_object<'a>(game: Option<&'a Value>, color: &str) -> Option<&'a Value> {
    let game = game?;
    game.get(color)
        .or_else(|| game.get("players").and_then(|p| p.get(color)))
        .filter(|v| v.is_object())
}

fn username(game: Option<&Value>, headers: &Map<String, Value>, color: &str) -> Option<String> {
    let key = if color == "white" { "White" } else { "Black" };
    header(headers, key).or_else(|| {
        player_object(game, color)
            .and_then(|p| p.get("username"))
            .and_then(scalar_string)
    })
}

fn time_control(game: Option<&Value>, headers: &Map<String, Value>) -> Option<String> {
    header(headers, "TimeControl").or_else(|| {
        game.and_then(|g| g.get("timeControl"))
            .and_then(scalar_string)
    })
}

fn move_tokens(envelope: &GameDataEnvelope) -> Vec<String> {
    if let Some(moves) = &envelope.dom.moves {
        return moves.clone();
    }
    envelope
        .globals
        .get(MIRRORED_MOVES_GLOBAL)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

/// `moveTimestamps` holds tenths of a second, as a comma list or an array
fn clock_seconds(envelope: &GameDataEnvelope) -> Vec<f64> {
    let raw = match game_object(envelope).and_then(|g| g.get("moveTimestamps")) {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    let tenths: Vec<f64> = match raw {
        Value::String(s) => s
            .split(',')
            .filter_map(|t| t.trim().parse::<f64>().ok())
            .collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_f64).collect(),
        _ => Vec::new(),
    };

    tenths.into_iter().map(|t| t / 10.0).collect()
}

// =============================================================================
// Helpers
// =============================================================================

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn winner_from_result(result: &str) -> Option<String> {
    match result.trim() {
        "1-0" => Some("white".into()),
        "0-1" => Some("black".into()),
        "1/2-1/2" => Some("draw".into()),
        _ => None,
    }
}

/// "180+2" → (180, 2); "600" → (600, 0); daily controls ("1/86400") → None
fn parse_time_control(control: &str) -> Option<(f64, f64)> {
    if control.contains('/') {
        return None;
    }
    let (base, increment) = control.split_once('+').unwrap_or((control, "0"));
    Some((base.trim().parse().ok()?, increment.trim().parse().ok()?))
}

fn side_to_move(ply_index: usize) -> &'static str {
    if ply_index % 2 == 0 {
        "white"
    } else {
        "black"
    }
}

fn round_tenths(seconds: f64) -> f64 {
    (seconds * 10.0).round() / 10.0
}
