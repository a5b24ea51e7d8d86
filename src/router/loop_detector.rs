use serde_json::Value;

/// Detects an agent re-issuing the same failing call
///
/// A signature is a function name plus its canonical JSON arguments. The
/// detector trips once the same signature has failed `repeat_threshold`
/// times in a row; any other outcome in between resets the run.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    repeat_threshold: u32,
    last_signature: Option<String>,
    repeats: u32,
}

impl LoopDetector {
    pub fn new(repeat_threshold: u32) -> Self {
        Self {
            repeat_threshold: repeat_threshold.max(1),
            last_signature: None,
            repeats: 0,
        }
    }

    pub fn signature(function: &str, arguments: &Value) -> String {
        format!("{}:{}", function, canonical(arguments))
    }

    /// Records a failed call; returns true when the loop threshold is reached
    pub fn record_failure(&mut self, signature: &str) -> bool {
        if self.last_signature.as_deref() == Some(signature) {
            self.repeats += 1;
        } else {
            self.last_signature = Some(signature.to_string());
            self.repeats = 1;
        }
        self.repeats >= self.repeat_threshold
    }

    pub fn reset(&mut self) {
        self.last_signature = None;
        self.repeats = 0;
    }

    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}

/// Copy of `value` with object keys in sorted order
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
