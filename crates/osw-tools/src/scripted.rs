use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::runner::{ToolOutput, ToolRunner};

/// Scripted test double: canned outputs per program, consumed in order.
/// The last queued output for a program is repeated once the queue runs
/// dry, so probes like `--version` can be scripted once. Unknown programs
/// behave like a binary missing from PATH (spawn error).
#[derive(Default)]
pub struct ScriptedTools {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    outputs: HashMap<String, VecDeque<ToolOutput>>,
    calls: Vec<(String, Vec<String>)>,
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&self, program: &str, output: ToolOutput) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .outputs
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Every invocation seen so far, as (program, args).
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, program: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == program)
            .count()
    }
}

impl ToolRunner for ScriptedTools {
    fn run(&self, _dir: &Path, program: &str, args: &[&str]) -> Result<ToolOutput> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push((program.to_string(), args.iter().map(|s| s.to_string()).collect()));
        let queue = inner
            .outputs
            .get_mut(program)
            .ok_or_else(|| anyhow!("spawn {}: no such file or directory", program))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| anyhow!("spawn {}: no such file or directory", program))
        }
    }
}
