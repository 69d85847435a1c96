//! Newline-delimited JSON protocol spoken over the daemon socket.
//!
//! ```text
//! → {"cmd":"apply","caller":"0x…","command":{"op":"create_organization",…}}
//! ← {"ok":true,"data":{"seq":1,"events":[…]}}
//! ← {"ok":false,"error":"…","kind":"unauthorized"}
//! ```

use std::io::{BufRead, BufReader, Lines, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use orgreg_core::{Address, Command, Query, QueryResult, Receipt, RegistryError};
use orgreg_ledger::{Compaction, LedgerEntry};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    pub fn apply(caller: Address, command: Command) -> Self {
        Self {
            caller: Some(caller),
            command: Some(command),
            ..Self::new("apply")
        }
    }

    pub fn query(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Self::new("query")
        }
    }

    pub fn events(from: u64) -> Self {
        Self {
            from: Some(from),
            ..Self::new("events")
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Category of a rejected registry operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            kind: None,
        }
    }

    pub fn rejected(err: &RegistryError) -> Self {
        Self {
            kind: Some(err.code().to_string()),
            ..Self::error(err.to_string())
        }
    }
}

fn connect(home: &Path) -> Result<UnixStream, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })
}

fn write_request(
    stream: &mut UnixStream,
    home: &Path,
    request: &DaemonRequest,
) -> Result<(), DaemonError> {
    let socket = socket_path(home);
    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    stream.write_all(&payload).map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))
}

fn read_response(
    lines: &mut Lines<BufReader<UnixStream>>,
    home: &Path,
) -> Result<Option<DaemonResponse>, DaemonError> {
    match lines.next() {
        None => Ok(None),
        Some(line) => {
            let line = line.map_err(|e| io_err(socket_path(home), e))?;
            Ok(Some(serde_json::from_str(line.trim_end())?))
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let mut stream = connect(home)?;
    write_request(&mut stream, home, request)?;

    let mut lines = BufReader::new(stream).lines();
    read_response(&mut lines, home)?.ok_or_else(|| {
        DaemonError::Protocol("daemon closed connection before responding".to_string())
    })
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

pub fn request_apply(
    home: &Path,
    caller: Address,
    command: Command,
) -> Result<Receipt, DaemonError> {
    let response = send_request(home, &DaemonRequest::apply(caller, command))?;
    decode(response_into_data(response)?)
}

pub fn request_query(home: &Path, query: Query) -> Result<QueryResult, DaemonError> {
    let response = send_request(home, &DaemonRequest::query(query))?;
    decode(response_into_data(response)?)
}

pub fn request_events(home: &Path, from: u64) -> Result<Vec<LedgerEntry>, DaemonError> {
    let response = send_request(home, &DaemonRequest::events(from))?;
    decode(response_into_data(response)?)
}

pub fn request_compact(home: &Path) -> Result<Compaction, DaemonError> {
    let response = send_request(home, &DaemonRequest::new("compact"))?;
    decode(response_into_data(response)?)
}

/// Stream of receipts pushed by the daemon after a `subscribe` request.
pub struct Subscription {
    home: std::path::PathBuf,
    lines: Lines<BufReader<UnixStream>>,
}

impl Iterator for Subscription {
    type Item = Result<Receipt, DaemonError>;

    fn next(&mut self) -> Option<Self::Item> {
        match read_response(&mut self.lines, &self.home) {
            Ok(None) => None,
            Ok(Some(response)) => Some(response_into_data(response).and_then(decode)),
            Err(err) => Some(Err(err)),
        }
    }
}

pub fn subscribe(home: &Path) -> Result<Subscription, DaemonError> {
    let mut stream = connect(home)?;
    write_request(&mut stream, home, &DaemonRequest::new("subscribe"))?;

    let mut lines = BufReader::new(stream).lines();
    let ack = read_response(&mut lines, home)?.ok_or_else(|| {
        DaemonError::Protocol("daemon closed connection before acknowledging".to_string())
    })?;
    response_into_data(ack)?;
    Ok(Subscription {
        home: home.to_path_buf(),
        lines,
    })
}

fn decode<T: DeserializeOwned>(data: Value) -> Result<T, DaemonError> {
    Ok(serde_json::from_value(data)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Rejected {
            kind: response.kind,
            message: response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgreg_core::{EntityKind, OrgId};

    #[test]
    fn apply_request_wire_shape() {
        let org_id = OrgId::from_label("acme").unwrap();
        let request = DaemonRequest::apply(
            Address([0x11; 20]),
            Command::DeleteOrganization { org_id },
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["cmd"], "apply");
        assert_eq!(json["command"]["op"], "delete_organization");
        assert!(json.get("query").is_none());
        assert!(json.get("from").is_none());
    }

    #[test]
    fn bare_command_request_parses() {
        let request: DaemonRequest = serde_json::from_str(r#"{"cmd":"status"}"#).unwrap();
        assert_eq!(request.cmd, "status");
        assert!(request.caller.is_none() && request.command.is_none());
    }

    #[test]
    fn rejected_response_carries_kind() {
        let err = RegistryError::NotFound {
            kind: EntityKind::Organization,
            key: "acme".into(),
        };
        let response = DaemonResponse::rejected(&err);
        assert!(!response.ok);
        assert_eq!(response.kind.as_deref(), Some("not_found"));

        match response_into_data(response) {
            Err(DaemonError::Rejected { kind, message }) => {
                assert_eq!(kind.as_deref(), Some("not_found"));
                assert!(message.contains("not found"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
