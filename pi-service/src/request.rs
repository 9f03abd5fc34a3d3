//! Request validation: raw JSON fields in, typed requests out.
//!
//! Every entry point runs exactly one validation pass.  Checks happen in a
//! fixed order and the first violation wins:
//!
//! 1. credentials (→ [`Rejection::Auth`])
//! 2. the operation's primary field (`simulations` or `protocol`)
//! 3. `concurrency` (optional, default 1)
//!
//! Presence follows the rules existing clients rely on: a supplied but
//! "falsy" value (`null`, `0`, `false`, `""`, `[]`, `{}`) counts as missing.
//! `concurrency` is the exception: once the key exists its value must be an
//! integer, so `null` or `"8"` is invalid rather than defaulted.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Raw request body: the top-level JSON object.
pub type Fields = Map<String, Value>;

pub const MIN_SIMULATIONS: u64 = 100;
pub const MAX_SIMULATIONS: u64 = 100_000_000;

/// Suffix appended to the username to form the expected password.
pub const PASSWORD_SUFFIX: &str = "-pw";

const USERNAME_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// A field checked by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Simulations,
    Concurrency,
    Protocol,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Simulations => "simulations",
            Field::Concurrency => "concurrency",
            Field::Protocol => "protocol",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a request was refused.  The `Display` form is the machine-readable
/// reason string sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("user info error")]
    Auth,
    #[error("missing field {0}")]
    MissingField(Field),
    #[error("invalid field {0}")]
    InvalidField(Field),
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

/// Number of parallel execution units for one request, always in
/// [`Concurrency::MIN`]`..=`[`Concurrency::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Concurrency(usize);

impl Concurrency {
    pub const MIN: usize = 1;
    pub const MAX: usize = 8;

    pub fn new(value: usize) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

/// Transport used to reach the legacy estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl FromStr for Transport {
    type Err = String;

    /// Only the exact lowercase names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(format!("Unknown transport: {}", s)),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Udp => f.write_str("udp"),
        }
    }
}

/// A caller whose username and password passed the credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub simulations: u64,
    pub concurrency: Concurrency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyQueryRequest {
    pub transport: Transport,
    pub concurrency: Concurrency,
}

// ---------------------------------------------------------------------------
// Validation passes
// ---------------------------------------------------------------------------

/// Returns true when `username`/`password` form a valid credential pair.
pub fn is_valid_user(username: &str, password: &str) -> bool {
    username.len() == USERNAME_LEN
        && username.bytes().all(|b| b.is_ascii_digit())
        && password.strip_suffix(PASSWORD_SUFFIX) == Some(username)
}

/// Credential check shared by every operation.
pub fn authenticate(fields: &Fields) -> Result<Credentials, Rejection> {
    let username = fields.get("username").and_then(Value::as_str);
    let password = fields.get("password").and_then(Value::as_str);
    match (username, password) {
        (Some(username), Some(password)) if is_valid_user(username, password) => Ok(Credentials {
            username: username.to_string(),
        }),
        _ => Err(Rejection::Auth),
    }
}

/// Validate a local simulation request.
pub fn simulation(fields: &Fields) -> Result<(Credentials, SimulationRequest), Rejection> {
    let credentials = authenticate(fields)?;

    let value = present(fields, "simulations").ok_or(Rejection::MissingField(Field::Simulations))?;
    let simulations = value
        .as_u64()
        .filter(|n| (MIN_SIMULATIONS..=MAX_SIMULATIONS).contains(n))
        .ok_or(Rejection::InvalidField(Field::Simulations))?;

    let concurrency = concurrency(fields)?;
    Ok((
        credentials,
        SimulationRequest {
            simulations,
            concurrency,
        },
    ))
}

/// Validate a legacy-estimator request.  The transport may be given as
/// `protocol` or `transport`; `protocol` wins when both are present.
pub fn legacy_query(fields: &Fields) -> Result<(Credentials, LegacyQueryRequest), Rejection> {
    let credentials = authenticate(fields)?;

    let value = present(fields, "protocol")
        .or_else(|| present(fields, "transport"))
        .ok_or(Rejection::MissingField(Field::Protocol))?;
    let transport = value
        .as_str()
        .and_then(|s| s.parse::<Transport>().ok())
        .ok_or(Rejection::InvalidField(Field::Protocol))?;

    let concurrency = concurrency(fields)?;
    Ok((
        credentials,
        LegacyQueryRequest {
            transport,
            concurrency,
        },
    ))
}

/// Validate a usage-statistics request (credentials only).
pub fn usage(fields: &Fields) -> Result<Credentials, Rejection> {
    authenticate(fields)
}

/// Optional `concurrency`: absent means the default, anything else must be
/// a JSON integer in range.
fn concurrency(fields: &Fields) -> Result<Concurrency, Rejection> {
    match fields.get("concurrency") {
        None => Ok(Concurrency::default()),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .and_then(Concurrency::new)
            .ok_or(Rejection::InvalidField(Field::Concurrency)),
    }
}

/// The value under `key`, unless it is absent or falsy.
fn present<'a>(fields: &'a Fields, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !is_falsy(value))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn valid_user() {
        assert!(is_valid_user("1110", "1110-pw"));
        assert!(is_valid_user("0000", "0000-pw"));
    }

    #[test]
    fn invalid_users() {
        assert!(!is_valid_user("", ""));
        assert!(!is_valid_user("", "1110-pw"));
        assert!(!is_valid_user("1110", ""));
        assert!(!is_valid_user("1111", "1112-pw"));
        assert!(!is_valid_user("s1111", "s1111-pw"));
        assert!(!is_valid_user("111", "111-pw"));
        assert!(!is_valid_user("11111", "11111-pw"));
        assert!(!is_valid_user("11a1", "11a1-pw"));
        assert!(!is_valid_user("1110", "1110-PW"));
        assert!(!is_valid_user("1110", "1110-pw "));
        // Non-ASCII digits are not accepted.
        assert!(!is_valid_user("١٢٣٤", "١٢٣٤-pw"));
    }

    #[test]
    fn numeric_username_is_auth_error() {
        let f = fields(json!({"username": 1111, "password": "1111-pw"}));
        assert_eq!(authenticate(&f), Err(Rejection::Auth));
    }

    #[test]
    fn missing_credentials_is_auth_error() {
        assert_eq!(authenticate(&Fields::new()), Err(Rejection::Auth));
    }

    #[test]
    fn auth_checked_before_fields() {
        let f = fields(json!({"username": "1111", "password": "nope"}));
        assert_eq!(simulation(&f), Err(Rejection::Auth));
        assert_eq!(legacy_query(&f), Err(Rejection::Auth));
    }

    #[test]
    fn reason_strings() {
        assert_eq!(Rejection::Auth.to_string(), "user info error");
        assert_eq!(
            Rejection::MissingField(Field::Simulations).to_string(),
            "missing field simulations"
        );
        assert_eq!(
            Rejection::InvalidField(Field::Simulations).to_string(),
            "invalid field simulations"
        );
        assert_eq!(
            Rejection::InvalidField(Field::Concurrency).to_string(),
            "invalid field concurrency"
        );
        assert_eq!(
            Rejection::MissingField(Field::Protocol).to_string(),
            "missing field protocol"
        );
        assert_eq!(
            Rejection::InvalidField(Field::Protocol).to_string(),
            "invalid field protocol"
        );
    }

    #[test]
    fn simulation_defaults_concurrency() {
        let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": 100}));
        let (creds, req) = simulation(&f).unwrap();
        assert_eq!(creds.username(), "1111");
        assert_eq!(req.simulations, 100);
        assert_eq!(req.concurrency.get(), 1);
    }

    #[test]
    fn simulation_missing() {
        let f = fields(json!({"username": "1111", "password": "1111-pw"}));
        assert_eq!(
            simulation(&f),
            Err(Rejection::MissingField(Field::Simulations))
        );
    }

    #[test]
    fn simulation_falsy_counts_as_missing() {
        for value in [json!(0), json!(null), json!(false), json!(""), json!(0.0)] {
            let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": value}));
            assert_eq!(
                simulation(&f),
                Err(Rejection::MissingField(Field::Simulations)),
                "value {value}"
            );
        }
    }

    #[test]
    fn simulation_out_of_range_or_wrong_type() {
        for value in [
            json!(1),
            json!(99),
            json!(100_000_001),
            json!(-5),
            json!("1000"),
            json!(1000.5),
            json!(true),
        ] {
            let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": value}));
            assert_eq!(
                simulation(&f),
                Err(Rejection::InvalidField(Field::Simulations)),
                "value {value}"
            );
        }
    }

    #[test]
    fn simulation_bounds_inclusive() {
        for n in [MIN_SIMULATIONS, MAX_SIMULATIONS] {
            let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": n}));
            assert_eq!(simulation(&f).unwrap().1.simulations, n);
        }
    }

    #[test]
    fn concurrency_rules() {
        for ok in 1..=8u64 {
            let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": 1000, "concurrency": ok}));
            assert_eq!(simulation(&f).unwrap().1.concurrency.get() as u64, ok);
        }
        for bad in [json!(0), json!(9), json!(-1), json!("8"), json!(null), json!(2.0), json!(true)] {
            let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": 1000, "concurrency": bad}));
            assert_eq!(
                simulation(&f),
                Err(Rejection::InvalidField(Field::Concurrency)),
                "value {bad}"
            );
        }
    }

    #[test]
    fn simulations_checked_before_concurrency() {
        let f = fields(json!({"username": "1111", "password": "1111-pw", "simulations": 1, "concurrency": 9}));
        assert_eq!(
            simulation(&f),
            Err(Rejection::InvalidField(Field::Simulations))
        );
    }

    #[test]
    fn legacy_protocol_rules() {
        let f = fields(json!({"username": "1112", "password": "1112-pw"}));
        assert_eq!(legacy_query(&f), Err(Rejection::MissingField(Field::Protocol)));

        let f = fields(json!({"username": "1112", "password": "1112-pw", "protocol": ""}));
        assert_eq!(legacy_query(&f), Err(Rejection::MissingField(Field::Protocol)));

        for bad in [json!("xxx"), json!("TCP"), json!(" udp"), json!(1)] {
            let f = fields(json!({"username": "1112", "password": "1112-pw", "protocol": bad}));
            assert_eq!(
                legacy_query(&f),
                Err(Rejection::InvalidField(Field::Protocol)),
                "value {bad}"
            );
        }

        let f = fields(json!({"username": "1112", "password": "1112-pw", "protocol": "udp", "concurrency": 4}));
        let (_, req) = legacy_query(&f).unwrap();
        assert_eq!(req.transport, Transport::Udp);
        assert_eq!(req.concurrency.get(), 4);
    }

    #[test]
    fn legacy_accepts_transport_alias() {
        let f = fields(json!({"username": "1112", "password": "1112-pw", "transport": "tcp"}));
        assert_eq!(legacy_query(&f).unwrap().1.transport, Transport::Tcp);
    }

    #[test]
    fn legacy_concurrency_string_rejected() {
        let f = fields(json!({"username": "1112", "password": "1112-pw", "protocol": "tcp", "concurrency": "1"}));
        assert_eq!(
            legacy_query(&f),
            Err(Rejection::InvalidField(Field::Concurrency))
        );
    }

    #[test]
    fn transport_round_trips_through_display() {
        for t in [Transport::Tcp, Transport::Udp] {
            assert_eq!(t.to_string().parse::<Transport>(), Ok(t));
        }
    }

    #[test]
    fn concurrency_bounds() {
        assert_eq!(Concurrency::new(0), None);
        assert_eq!(Concurrency::new(9), None);
        assert_eq!(Concurrency::new(8).map(Concurrency::get), Some(8));
        assert_eq!(Concurrency::default().get(), 1);
    }
}
