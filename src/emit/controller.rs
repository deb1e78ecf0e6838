//! Lab controller interface and the CML REST client.
//!
//! [`LabController`] is the narrow set of calls the live backend needs.
//! [`CmlClient`] implements it against the CML `api/v0` REST API with a
//! blocking reqwest client and a bearer token.

use std::path::{Path, PathBuf};

use log::debug;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}: {body}")]
    Response {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    Unexpected { endpoint: String, reason: String },

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("authentication as '{username}' failed")]
    Authentication { username: String },

    #[error("controller setting {0} is not set")]
    MissingSetting(&'static str),

    #[error("failed to read CA certificate {}: {source}", .path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One node to create on the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRequest {
    pub label: String,
    pub node_definition: String,
    pub x: i64,
    pub y: i64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hide_links: bool,
}

/// Calls the live backend makes, in the order it makes them.
pub trait LabController {
    /// Returns the new lab id.
    fn create_lab(&mut self, title: &str, description: &str, notes: &str) -> Result<String, ControllerError>;

    /// Returns the new node id.
    fn create_node(&mut self, lab: &str, node: &NodeRequest) -> Result<String, ControllerError>;

    /// Returns the new interface id.
    fn create_interface(&mut self, lab: &str, node: &str, slot: u32) -> Result<String, ControllerError>;

    /// Returns the new link id.
    fn create_link(&mut self, lab: &str, a: &str, b: &str) -> Result<String, ControllerError>;

    fn set_configuration(&mut self, lab: &str, node: &str, configuration: &str) -> Result<(), ControllerError>;

    /// Lab YAML as the controller exports it.
    fn export_lab(&mut self, lab: &str) -> Result<String, ControllerError>;
}

/// Where and how to reach the controller.
#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub ca_file: Option<PathBuf>,
    pub insecure: bool,
}

impl ControllerSettings {
    /// Read `VIRL2_URL`, `VIRL2_USER` and `VIRL2_PASS`.
    pub fn from_env(ca_file: Option<PathBuf>, insecure: bool) -> Result<Self, ControllerError> {
        let var = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.is_empty())
                .ok_or(ControllerError::MissingSetting(name))
        };
        Ok(ControllerSettings {
            url: var("VIRL2_URL")?,
            username: var("VIRL2_USER")?,
            password: var("VIRL2_PASS")?,
            ca_file,
            insecure,
        })
    }

    /// API base, accepting either a bare host or a full URL.
    fn api_base(&self) -> String {
        let url = self.url.trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            format!("{url}/api/v0")
        } else {
            format!("https://{url}/api/v0")
        }
    }
}

/// Authenticated CML REST client.
#[derive(Debug)]
pub struct CmlClient {
    client: Client,
    base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

impl CmlClient {
    /// Build the HTTP client and log in.
    pub fn connect(settings: &ControllerSettings) -> Result<Self, ControllerError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(settings.insecure);
        if let Some(path) = &settings.ca_file {
            builder = builder.add_root_certificate(read_certificate(path)?);
        }
        let client = builder.build()?;
        let base = settings.api_base();

        let endpoint = format!("{base}/authenticate");
        let resp = client
            .post(&endpoint)
            .json(&json!({ "username": settings.username, "password": settings.password }))
            .send()?;
        if resp.status().as_u16() == 403 || resp.status().as_u16() == 401 {
            return Err(ControllerError::Authentication {
                username: settings.username.clone(),
            });
        }
        let token: String = checked(&endpoint, resp)?.json()?;
        debug!("Authenticated against {base} as {}", settings.username);
        Ok(CmlClient { client, base, token })
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ControllerError> {
        let endpoint = format!("{}/{}", self.base, path);
        let resp = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(body)
            .send()?;
        Ok(checked(&endpoint, resp)?.json()?)
    }

    fn created_id(&self, path: &str, body: &Value) -> Result<String, ControllerError> {
        let endpoint = format!("{}/{}", self.base, path);
        let value = self.post(path, body)?;
        // interface creation answers with a list
        let value = match value {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        serde_json::from_value::<Created>(value)
            .map(|created| created.id)
            .map_err(|err| ControllerError::Unexpected {
                endpoint,
                reason: err.to_string(),
            })
    }
}

impl LabController for CmlClient {
    fn create_lab(&mut self, title: &str, description: &str, notes: &str) -> Result<String, ControllerError> {
        self.created_id(
            "labs",
            &json!({ "title": title, "description": description, "notes": notes }),
        )
    }

    fn create_node(&mut self, lab: &str, node: &NodeRequest) -> Result<String, ControllerError> {
        self.created_id(
            &format!("labs/{lab}/nodes?populate_interfaces=false"),
            &serde_json::to_value(node)?,
        )
    }

    fn create_interface(&mut self, lab: &str, node: &str, slot: u32) -> Result<String, ControllerError> {
        self.created_id(
            &format!("labs/{lab}/interfaces"),
            &json!({ "node": node, "slot": slot }),
        )
    }

    fn create_link(&mut self, lab: &str, a: &str, b: &str) -> Result<String, ControllerError> {
        self.created_id(
            &format!("labs/{lab}/links"),
            &json!({ "src_int": a, "dst_int": b }),
        )
    }

    fn set_configuration(&mut self, lab: &str, node: &str, configuration: &str) -> Result<(), ControllerError> {
        let endpoint = format!("{}/labs/{lab}/nodes/{node}", self.base);
        let resp = self
            .client
            .patch(&endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "configuration": configuration }))
            .send()?;
        checked(&endpoint, resp)?;
        Ok(())
    }

    fn export_lab(&mut self, lab: &str) -> Result<String, ControllerError> {
        let endpoint = format!("{}/labs/{lab}/download", self.base);
        let resp = self.client.get(&endpoint).bearer_auth(&self.token).send()?;
        Ok(checked(&endpoint, resp)?.text()?)
    }
}

fn checked(endpoint: &str, resp: Response) -> Result<Response, ControllerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(ControllerError::Response {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body: resp.text().unwrap_or_default(),
    })
}

fn read_certificate(path: &Path) -> Result<reqwest::Certificate, ControllerError> {
    let pem = std::fs::read(path).map_err(|source| ControllerError::Certificate {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(reqwest::Certificate::from_pem(&pem)?)
}
