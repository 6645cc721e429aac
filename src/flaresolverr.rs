use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// FlareSolverr refuses requests without a browser-ish user agent.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Serialize)]
struct Command<'a> {
    cmd: &'a str,
    #[serde(rename = "userAgent")]
    user_agent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
}

impl<'a> Command<'a> {
    fn new(cmd: &'a str) -> Self {
        Command {
            cmd,
            user_agent: USER_AGENT,
            url: None,
            session: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<Solution>,
    session: Option<String>,
    #[serde(default)]
    sessions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    response: String,
}

/// Client for a local FlareSolverr instance, which drives a real browser
/// through anti-bot challenges and hands back the solved page. Sessions are
/// optional; with one open, the solver reuses its browser between requests.
pub struct FlareSolverr {
    endpoint: String,
    client: Client,
    session: Option<String>,
}

impl FlareSolverr {
    pub fn new(port: u16) -> Self {
        FlareSolverr::with_api_version(port, 1)
    }

    pub fn with_api_version(port: u16, api_version: u8) -> Self {
        FlareSolverr {
            endpoint: format!("http://localhost:{}/v{}", port, api_version),
            client: Client::new(),
            session: None,
        }
    }

    /// Fetches a page through the solver, returning the solved document.
    pub fn get(&self, url: &Url) -> Result<String, Error> {
        let mut command = Command::new("request.get");
        command.url = Some(url.as_str());
        command.session = self.session.as_deref();
        let envelope = self.send(&command)?;
        let solution = envelope
            .solution
            .ok_or_else(|| Error::Solver("response carried no solution".to_string()))?;
        Ok(solution.response)
    }

    /// Opens a browser session on the solver for subsequent requests.
    pub fn open(&mut self) -> Result<(), Error> {
        let envelope = self.send(&Command::new("sessions.create"))?;
        let session = envelope
            .session
            .ok_or_else(|| Error::Solver("session.create returned no session".to_string()))?;
        self.session = Some(session);
        Ok(())
    }

    /// Destroys the session opened by [`FlareSolverr::open`], if any.
    pub fn close(&mut self) -> Result<(), Error> {
        if let Some(session) = self.session.take() {
            let mut command = Command::new("sessions.destroy");
            command.session = Some(&session);
            self.send(&command)?;
        }
        Ok(())
    }

    pub fn list_sessions(&self) -> Result<Vec<String>, Error> {
        Ok(self.send(&Command::new("sessions.list"))?.sessions)
    }

    fn send(&self, command: &Command) -> Result<Envelope, Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(command)
            .send()
            .map_err(|_| {
                Error::Solver("FlareSolverr is either not running or is misconfigured".to_string())
            })?;
        if !response.status().is_success() {
            return Err(Error::Solver(format!(
                "endpoint answered with status {}",
                response.status()
            )));
        }
        let envelope: Envelope = response
            .json()
            .map_err(|_| Error::Solver("malformed response envelope".to_string()))?;
        if envelope.status != "ok" {
            return Err(Error::Solver(envelope.message));
        }
        Ok(envelope)
    }
}

#[test]
fn test_commands_omit_absent_parameters() {
    let command = Command::new("sessions.list");
    let json = serde_json::to_value(&command).unwrap();
    assert_eq!(
        serde_json::json!({
            "cmd": "sessions.list",
            "userAgent": USER_AGENT,
        }),
        json
    );
}

#[test]
fn test_solved_envelope_parses() {
    let envelope: Envelope = serde_json::from_str(
        r#"{"status":"ok","message":"","solution":{"url":"https://example.com/","status":200,"response":"<html></html>"},"startTimestamp":1,"endTimestamp":2,"version":"3.3.21"}"#,
    )
    .unwrap();
    assert_eq!("ok", envelope.status);
    assert_eq!("<html></html>", envelope.solution.unwrap().response);
}

#[test]
fn test_error_envelope_parses() {
    let envelope: Envelope = serde_json::from_str(
        r#"{"status":"error","message":"Error: timeout","startTimestamp":1,"endTimestamp":2}"#,
    )
    .unwrap();
    assert_eq!("error", envelope.status);
    assert_eq!("Error: timeout", envelope.message);
    assert!(envelope.solution.is_none());
}
