use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use serde_json::{Map, Value, json};

use crate::{
    error::ServiceError,
    transport::{ApiRequest, ApiResponse},
};

pub mod test_constants {
    pub const ENTITY: &str = "user";
    pub const JDOE_DN: &str = "uid=jdoe,ou=people,dc=example,dc=org";
    pub const ASMITH_DN: &str = "uid=asmith,ou=people,dc=example,dc=org";
    pub const CREATED_DN: &str = "uid=created,ou=people,dc=example,dc=org";
}

pub mod responses {
    use super::*;

    pub fn status(code: u16, body: &str) -> ApiResponse {
        ApiResponse {
            status: reqwest::StatusCode::from_u16(code).unwrap(),
            body: body.to_string(),
        }
    }

    pub fn ok(body: &str) -> ApiResponse {
        status(200, body)
    }

    pub fn json(value: Value) -> ApiResponse {
        ok(&value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FakeTab {
    pub class: String,
    pub active: bool,
    pub values: Map<String, Value>,
}

impl FakeTab {
    pub fn new(class: &str, active: bool, values: Value) -> Self {
        Self {
            class: class.to_string(),
            active,
            values: values.as_object().cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub dn: String,
    pub tabs: Vec<FakeTab>,
}

impl FakeObject {
    /// All values of an attribute, looked up across every tab.
    fn values_of(&self, attribute: &str) -> Vec<Value> {
        self.tabs
            .iter()
            .filter_map(|tab| tab.values.get(attribute))
            .flat_map(|value| match value {
                Value::Array(values) => values.clone(),
                Value::String(s) if s.is_empty() => Vec::new(),
                other => vec![other.clone()],
            })
            .collect()
    }

    /// Good enough for tests: an object matches if the filter contains an equality assertion on one of its values.
    fn matches(&self, filter: Option<&str>) -> bool {
        let Some(filter) = filter else { return true };
        self.tabs.iter().any(|tab| {
            tab.values.keys().any(|attribute| {
                self.values_of(attribute)
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|value| filter.contains(&format!("({attribute}={value})")))
            })
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub logins: usize,
    pub valid_tokens: HashSet<String>,
    pub objects: Vec<FakeObject>,
    pub created: Vec<Value>,
    pub patched: Vec<(String, Value)>,
    pub put: Vec<(String, String, Value)>,
    pub deleted_attributes: Vec<(String, String)>,
    pub deleted_objects: Vec<String>,
}

/// An in-process imitation of the FusionDirectory REST API, answering the requests of the mock transport.
#[derive(Debug, Clone, Default)]
pub struct FakeFusionDirectory {
    state: Arc<Mutex<FakeState>>,
}

impl FakeFusionDirectory {
    pub const USER: &'static str = "fd-admin";
    pub const PASSWORD: &'static str = "secret";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, dn: &str, tabs: Vec<FakeTab>) -> Self {
        self.state.lock().unwrap().objects.push(FakeObject { dn: dn.to_string(), tabs });
        self
    }

    /// Invalidate every session token issued so far, as FusionDirectory does when sessions time out.
    pub fn expire_sessions(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn responder(&self) -> impl Fn(&ApiRequest) -> Result<ApiResponse, ServiceError> + Send + Sync + 'static {
        let state = self.state.clone();
        move |request| Ok(Self::answer(&mut state.lock().unwrap(), request))
    }

    fn answer(state: &mut FakeState, request: &ApiRequest) -> ApiResponse {
        let path: Vec<&str> = request.path.iter().map(String::as_str).collect();
        if path == ["login"] {
            return Self::login(state, request);
        }
        match &request.session_token {
            Some(token) if state.valid_tokens.contains(token) => (),
            _ => return responses::status(401, "\"Session token is invalid\""),
        }

        match (request.method.as_str(), path.as_slice()) {
            ("GET", ["token"]) => responses::ok("\"ok\""),
            ("GET", ["objects", _]) => Self::search(state, request),
            ("POST", ["objects", _]) => {
                state.created.push(request.body.clone().unwrap_or(Value::Null));
                responses::json(json!(test_constants::CREATED_DN))
            }
            ("GET", ["objects", _, dn]) => match Self::object(state, dn) {
                Some(object) => responses::json(Value::Array(
                    object
                        .tabs
                        .iter()
                        .map(|tab| json!({"class": tab.class, "name": tab.class.to_uppercase(), "active": tab.active}))
                        .collect(),
                )),
                None => responses::status(404, "\"Object not found\""),
            },
            ("GET", ["objects", _, dn, tab]) => match Self::object(state, dn).and_then(|o| o.tabs.iter().find(|t| t.class == *tab)) {
                Some(tab) if tab.active => responses::json(Value::Object(tab.values.clone())),
                Some(_) => responses::status(400, "\"Tab is not active\""),
                None => responses::status(404, "\"Tab not found\""),
            },
            ("PATCH", ["objects", _, dn]) => {
                if Self::object(state, dn).is_none() {
                    return responses::status(404, "\"Object not found\"");
                }
                state.patched.push((dn.to_string(), request.body.clone().unwrap_or(Value::Null)));
                responses::json(json!(dn))
            }
            ("PUT", ["objects", _, dn, tab, attribute]) => {
                state
                    .put
                    .push((dn.to_string(), format!("{tab}/{attribute}"), request.body.clone().unwrap_or(Value::Null)));
                responses::json(json!(dn))
            }
            ("DELETE", ["objects", _, dn, tab, attribute]) => {
                state.deleted_attributes.push((dn.to_string(), format!("{tab}/{attribute}")));
                responses::json(json!(dn))
            }
            ("DELETE", ["objects", _, dn]) => {
                state.objects.retain(|o| o.dn != *dn);
                state.deleted_objects.push(dn.to_string());
                responses::json(json!(dn))
            }
            _ => responses::status(400, "\"Unsupported request\""),
        }
    }

    fn login(state: &mut FakeState, request: &ApiRequest) -> ApiResponse {
        let body = request.body.clone().unwrap_or(Value::Null);
        if body["user"] != Self::USER || body["password"] != Self::PASSWORD {
            return responses::status(401, "\"Invalid credentials\"");
        }
        state.logins += 1;
        let token = format!("token-{}", state.logins);
        state.valid_tokens.insert(token.clone());
        responses::ok(&format!("\"{token}\"\n"))
    }

    fn object<'a>(state: &'a FakeState, dn: &str) -> Option<&'a FakeObject> {
        state.objects.iter().find(|o| o.dn == dn)
    }

    fn search(state: &FakeState, request: &ApiRequest) -> ApiResponse {
        let requested: Vec<&str> = request
            .query
            .iter()
            .filter_map(|(key, _)| key.strip_prefix("attrs[").and_then(|k| k.strip_suffix(']')))
            .collect();
        let base = request.query_value("base");
        let filter = request.query_value("filter");

        let mut result = Map::new();
        for object in state.objects.iter() {
            if base.is_some_and(|base| !object.dn.ends_with(base)) || !object.matches(filter) {
                continue;
            }
            let mut attributes = Map::new();
            for attribute in requested.iter() {
                let values = object.values_of(attribute);
                if !values.is_empty() {
                    attributes.insert(attribute.to_string(), Value::Array(values));
                }
            }
            result.insert(object.dn.clone(), Value::Object(attributes));
        }
        responses::json(Value::Object(result))
    }
}

/// A directory with two users. jdoe has an inactive mail tab.
pub fn populated_directory() -> FakeFusionDirectory {
    FakeFusionDirectory::new()
        .with_object(
            test_constants::JDOE_DN,
            vec![
                FakeTab::new(
                    "user",
                    true,
                    json!({
                        "uid": "jdoe",
                        "sn": "Doe",
                        "givenName": "",
                        "uidNumber": 1042,
                        "description": ["lang-fr;Développeur", "lang-en;Developer", "no option"],
                        "userPassword": "{SSHA}abc",
                    }),
                ),
                FakeTab::new("mailAccount", false, json!({})),
                FakeTab::new("posixAccount", true, json!({"loginShell": "/bin/bash", "gidNumber": 100})),
            ],
        )
        .with_object(
            test_constants::ASMITH_DN,
            vec![
                FakeTab::new(
                    "user",
                    true,
                    json!({
                        "uid": "asmith",
                        "sn": "Smith",
                        "givenName": "Alice",
                        "uidNumber": 1043,
                        "description": "lang-en;Manager",
                        "userPassword": "",
                    }),
                ),
                FakeTab::new(
                    "mailAccount",
                    true,
                    json!({"mail": "alice@example.org", "gosaMailAlternateAddress": ["a@example.org", "smith@example.org"]}),
                ),
                FakeTab::new("posixAccount", true, json!({"loginShell": "/bin/zsh", "gidNumber": 100})),
            ],
        )
}
