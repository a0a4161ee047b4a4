#![allow(dead_code)]

use email_segregation::{Engine, EngineError, EngineFactory, EngineValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

static CALL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+) = ([\w.]+)\.(\w+)\(([\w, ]*)\)$").unwrap()
});

pub type Namespace = Arc<Mutex<BTreeMap<String, EngineValue>>>;

type Responder = dyn Fn(&str, &[String]) -> Result<EngineValue, EngineError> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Eval(String),
    Set(String),
    Get(String),
}

/// Everything the scripted engines report back to the test
#[derive(Default)]
pub struct Shared {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub steps: Mutex<Vec<Step>>,
    pub namespaces: Mutex<Vec<Namespace>>,
}

impl Shared {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    /// Names bound in any engine's namespace right now
    pub fn bound_names(&self) -> Vec<String> {
        self.namespaces
            .lock()
            .unwrap()
            .iter()
            .flat_map(|ns| ns.lock().unwrap().keys().cloned().collect::<Vec<_>>())
            .collect()
    }
}

pub struct ScriptedFactory {
    shared: Arc<Shared>,
    responder: Arc<Responder>,
    fail: bool,
}

impl ScriptedFactory {
    pub fn new(
        responder: impl Fn(&str, &[String]) -> Result<EngineValue, EngineError>
        + Send
        + Sync
        + 'static,
    ) -> (Self, Arc<Shared>) {
        let shared = Arc::new(Shared::default());
        let factory = Self {
            shared: Arc::clone(&shared),
            responder: Arc::new(responder),
            fail: false,
        };
        (factory, shared)
    }

    /// Responds to every call with `value`
    pub fn returning(value: EngineValue) -> (Self, Arc<Shared>) {
        Self::new(move |_, _| Ok(value.clone()))
    }

    pub fn failing() -> (Self, Arc<Shared>) {
        let (mut factory, shared) = Self::new(|_, _| Ok(EngineValue::None));
        factory.fail = true;
        (factory, shared)
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn Engine>, EngineError> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EngineError::new("ImportError: interpreter unavailable"));
        }

        let namespace: Namespace = Arc::default();
        self.shared
            .namespaces
            .lock()
            .unwrap()
            .push(Arc::clone(&namespace));
        Ok(Box::new(ScriptedEngine {
            namespace,
            modules: Vec::new(),
            shared: Arc::clone(&self.shared),
            responder: Arc::clone(&self.responder),
        }))
    }
}

/// In-memory stand-in for an interpreter with a persistent global namespace
pub struct ScriptedEngine {
    namespace: Namespace,
    modules: Vec<String>,
    shared: Arc<Shared>,
    responder: Arc<Responder>,
}

impl ScriptedEngine {
    fn record(&self, step: Step) {
        self.shared.steps.lock().unwrap().push(step);
    }

    fn lookup(&self, name: &str) -> Result<EngineValue, EngineError> {
        self.namespace
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::new(format!("NameError: name '{name}' is not defined")))
    }
}

impl Engine for ScriptedEngine {
    fn eval(&mut self, statement: &str) -> Result<(), EngineError> {
        self.record(Step::Eval(statement.to_string()));

        if let Some(module) = statement.strip_prefix("import ") {
            if !self.modules.iter().any(|m| m == module) {
                self.modules.push(module.to_string());
            }
            return Ok(());
        }

        if let Some(name) = statement.strip_prefix("del ") {
            return self
                .namespace
                .lock()
                .unwrap()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| EngineError::new(format!("NameError: name '{name}' is not defined")));
        }

        let caps = CALL_REGEX
            .captures(statement)
            .ok_or_else(|| EngineError::new(format!("SyntaxError: {statement}")))?;
        if !self.modules.iter().any(|m| m == &caps[2]) {
            return Err(EngineError::new(format!(
                "NameError: name '{}' is not defined",
                &caps[2]
            )));
        }

        let args = caps[4]
            .split(", ")
            .filter(|a| !a.is_empty())
            .map(|name| match self.lookup(name)? {
                EngineValue::Str(s) => Ok(s),
                other => Err(EngineError::new(format!("TypeError: {other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = (self.responder)(&caps[3], &args)?;
        self.namespace
            .lock()
            .unwrap()
            .insert(caps[1].to_string(), result);
        Ok(())
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.record(Step::Set(name.to_string()));
        self.namespace
            .lock()
            .unwrap()
            .insert(name.to_string(), EngineValue::Str(value.to_string()));
        Ok(())
    }

    fn get_value(&mut self, name: &str) -> Result<EngineValue, EngineError> {
        self.record(Step::Get(name.to_string()));
        self.lookup(name)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Marks lines the way the external classifier would for simple inputs:
/// blank, quoted, `From:` header starting a message, or text.
pub fn classify_lines(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                'e'
            } else if line.starts_with('>') {
                'm'
            } else if line.starts_with("From:") {
                's'
            } else {
                't'
            }
        })
        .collect()
}

/// Splits off everything from the first `--` line
pub fn split_at_dashes(text: &str) -> EngineValue {
    match text.find("\n--\n") {
        Some(pos) => vec![&text[..pos], &text[pos + 1..]].into(),
        None => vec![text, ""].into(),
    }
}

/// A responder implementing all three operations with the helpers above
pub fn line_classifier(function: &str, args: &[String]) -> Result<EngineValue, EngineError> {
    match function {
        "splitEmail" => Ok(EngineValue::Str(classify_lines(&args[0]))),
        "extractSignature" => Ok(split_at_dashes(&args[0])),
        "extractSignature_MachineLearning" => {
            let EngineValue::List(mut parts) = split_at_dashes(&args[0]) else {
                unreachable!()
            };
            if let Some(EngineValue::Str(signature)) = parts.get(1)
                && signature.is_empty()
                && let Some(pos) = args[0].rfind(args[1].as_str())
            {
                let line_start = args[0][..pos].rfind('\n').map_or(0, |p| p + 1);
                parts = vec![
                    args[0][..line_start].trim_end().into(),
                    args[0][line_start..].into(),
                ];
            }
            Ok(EngineValue::List(parts))
        }
        other => Err(EngineError::new(format!(
            "AttributeError: module has no attribute '{other}'"
        ))),
    }
}
