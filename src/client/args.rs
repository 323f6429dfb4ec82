//! Parameter overrides and command line parsing for `ghibli-client`

use serde_json::{Map, Value};
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_PATH: &str = "output.png";

pub const USAGE: &str = "usage: ghibli-client <image_path> [output_path] [--<parameter> <value>]...

Parameters override the request defaults, e.g.
  ghibli-client input.png custom_output.png --num_inference_steps 50 --guidance_scale 4.0 --seed 123";

/// Keyword overrides merged over the default request payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides(Map<String, Value>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one parameter; later calls win
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge over `base`, overriding keys that collide
    pub fn apply(&self, base: &mut Map<String, Value>) {
        for (key, value) in &self.0 {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Parsed `ghibli-client` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ClientArgs {
    pub image_path: PathBuf,
    pub output_path: PathBuf,
    pub overrides: Overrides,
}

/// Parse arguments (without the program name).
///
/// `--key value` and `--key=value` both work. Values that parse as JSON keep
/// their type (`--seed 7` is a number), anything else is sent as a string.
pub fn parse_args<I, S>(args: I) -> Result<ClientArgs, String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut positional = Vec::new();
    let mut overrides = Overrides::new();
    let mut iter = args.into_iter().map(Into::into);

    while let Some(arg) = iter.next() {
        if arg == "-h" || arg == "--help" {
            return Err(USAGE.to_string());
        }

        let Some(flag) = arg.strip_prefix("--") else {
            positional.push(arg);
            continue;
        };

        let (key, raw) = match flag.split_once('=') {
            Some((key, raw)) => (key.to_string(), raw.to_string()),
            None => {
                let raw = iter
                    .next()
                    .ok_or_else(|| format!("missing value for --{}\n\n{}", flag, USAGE))?;
                (flag.to_string(), raw)
            }
        };

        if key.is_empty() {
            return Err(format!("empty parameter name\n\n{}", USAGE));
        }
        overrides = overrides.set(key, parse_value(&raw));
    }

    let mut positional = positional.into_iter();
    let image_path = positional
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| format!("missing image path\n\n{}", USAGE))?;
    let output_path = positional
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH));
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument '{}'\n\n{}", extra, USAGE));
    }

    Ok(ClientArgs {
        image_path,
        output_path,
        overrides,
    })
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
