//! Line-delimited JSON protocol.
//!
//! Each request is one JSON object per line, tagged by `op`:
//!
//! ```text
//! {"op":"hello","user":"tg:42"}
//! {"op":"available_start_times","date":"2026-10-20","table":"any"}
//! {"op":"update_intent","date":"2026-10-20","table_id":2,"start_time":"19:00","end_time":"22:00"}
//! {"op":"commit"}
//! ```
//!
//! Each response is one line: `{"status":"ok","data":...}` or
//! `{"status":"error","kind":"slot_taken","message":"..."}`.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::orchestrator::{BookingError, BookingService, IntentUpdate, Role};
use crate::session::{Session, SessionError, SessionStore};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello {
        user: String,
        admin_token: Option<String>,
    },
    Tables,
    AvailableDates,
    AvailableStartTimes {
        date: NaiveDate,
        #[serde(default)]
        table: TablePreference,
    },
    BestTable {
        date: NaiveDate,
        start_time: SlotTime,
    },
    EndTimes {
        date: NaiveDate,
        start_time: SlotTime,
        table_id: TableId,
    },
    UpdateIntent {
        #[serde(flatten)]
        update: IntentUpdate,
    },
    Commit,
    Reset,
    Cancel {
        id: Ulid,
    },
    ListBookings {
        #[serde(default)]
        filter: BookingFilter,
    },
    BlockDay {
        date: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { data: Value },
    Error { kind: String, message: String },
}

/// A request that could not be served, as reported to the caller.
#[derive(Debug)]
struct Failure {
    kind: &'static str,
    message: String,
}

impl Failure {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<BookingError> for Failure {
    fn from(e: BookingError) -> Self {
        if matches!(e, BookingError::Ledger(_) | BookingError::Grid(_)) {
            warn!("request failed: {e}");
        }
        Failure::new(e.kind(), e.public_message())
    }
}

impl From<SessionError> for Failure {
    fn from(e: SessionError) -> Self {
        let kind = match e {
            SessionError::UnknownUser => "no_session",
            SessionError::UserKeyTooLong => "invalid",
            SessionError::TooManySessions => "unavailable",
        };
        Failure::new(kind, e.to_string())
    }
}

fn data<T: Serialize>(value: T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|e| Failure::new("internal", e.to_string()))
}

/// Shared state every connection serves requests against.
pub struct Context {
    pub service: Arc<BookingService>,
    pub sessions: Arc<SessionStore>,
    pub admin_token: Option<String>,
}

/// Per-connection state: the user and role bound by this connection's own
/// `hello`. Another connection greeting with the same user key shares the
/// intent but never changes this role.
#[derive(Default)]
struct Connection {
    bound: Option<(String, Role)>,
}

impl Connection {
    fn session(&self, ctx: &Context) -> Result<(String, Role, Session), Failure> {
        let (user, role) = self.bound.as_ref().ok_or(SessionError::UnknownUser)?;
        let session = ctx.sessions.get(user)?;
        Ok((user.clone(), role.clone(), session))
    }

    /// A guest who just booked is known by that phone from now on.
    fn adopt_phone(&mut self, phone: &str) {
        if let Some((_, Role::Guest { phone: own })) = &mut self.bound
            && own.is_none()
        {
            *own = Some(phone.to_string());
        }
    }
}

pub async fn process_connection(socket: TcpStream, ctx: Arc<Context>) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let mut conn = Connection::default();

    while let Some(line) = framed.next().await {
        let response = match line {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(&ctx, &mut conn, &line).await,
            Err(LinesCodecError::MaxLineLengthExceeded) => Response::Error {
                kind: "invalid".into(),
                message: format!("line exceeds {MAX_LINE_LEN} bytes"),
            },
            Err(e) => return Err(e),
        };
        let encoded = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"status":"error","kind":"internal","message":"encode failed"}"#.into());
        framed.send(encoded).await?;
    }
    Ok(())
}

async fn handle_line(ctx: &Context, conn: &mut Connection, line: &str) -> Response {
    let req: Request = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            debug!("bad request line: {e}");
            return Response::Error {
                kind: "invalid".into(),
                message: format!("bad request: {e}"),
            };
        }
    };

    let label = observability::request_label(&req);
    let start = Instant::now();
    let result = dispatch(ctx, conn, req).await;
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => status).increment(1);
    metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => label)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(data) => Response::Ok { data },
        Err(f) => Response::Error {
            kind: f.kind.to_string(),
            message: f.message,
        },
    }
}

async fn dispatch(ctx: &Context, conn: &mut Connection, req: Request) -> Result<Value, Failure> {
    let service = &ctx.service;
    match req {
        Request::Hello { user, admin_token } => {
            let role = match admin_token {
                None => Role::Guest { phone: None },
                Some(token) if ctx.admin_token.as_deref() == Some(token.as_str()) => Role::Admin,
                Some(_) => return Err(Failure::new("forbidden", "bad admin token")),
            };
            let session = ctx.sessions.start(&user)?;
            let label = if role.is_admin() { "admin" } else { "guest" };
            conn.bound = Some((user.clone(), role));
            Ok(json!({
                "user": user,
                "role": label,
                "intent": session.intent,
            }))
        }
        Request::Tables => data(service.tables()),
        Request::AvailableDates => {
            conn.session(ctx)?;
            data(service.available_dates().await?)
        }
        Request::AvailableStartTimes { date, table } => {
            conn.session(ctx)?;
            data(service.available_start_times(date, table).await?)
        }
        Request::BestTable { date, start_time } => {
            conn.session(ctx)?;
            let (table_id, end_times) = service.best_table_and_end_times(date, start_time).await?;
            Ok(json!({ "table_id": table_id, "end_times": end_times }))
        }
        Request::EndTimes {
            date,
            start_time,
            table_id,
        } => {
            conn.session(ctx)?;
            data(service.end_times_for_table(date, start_time, table_id).await?)
        }
        Request::UpdateIntent { update } => {
            let (user, _, _) = conn.session(ctx)?;
            data(ctx.sessions.update_intent(&user, update)?)
        }
        Request::Commit => {
            let (user, role, session) = conn.session(ctx)?;
            let outcome = service.commit_booking(&role, &session.intent).await?;
            ctx.sessions.reset_intent(&user)?;
            conn.adopt_phone(&outcome.reservation.client_phone);
            data(outcome)
        }
        Request::Reset => {
            let (user, _, _) = conn.session(ctx)?;
            ctx.sessions.reset_intent(&user)?;
            Ok(Value::Null)
        }
        Request::Cancel { id } => {
            let (_, role, _) = conn.session(ctx)?;
            data(service.cancel_booking(&role, id).await?)
        }
        Request::ListBookings { filter } => {
            let (_, role, _) = conn.session(ctx)?;
            data(service.list_bookings(&role, filter)?)
        }
        Request::BlockDay { date } => {
            let (_, role, _) = conn.session(ctx)?;
            let blocked = service.block_day(&role, date).await?;
            Ok(json!({ "blocked": blocked }))
        }
    }
}
