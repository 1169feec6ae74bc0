//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted agents that replay queued outputs
//! - Scripted test runners (pass, fail, hang, crash)
//! - Canned agent outputs and design documents

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use tddflow::orchestration::{
    Agent, CodeFiles, FileManager, MemoryFileManager, TddOrchestrator, TestResult, TestRunReport, TestRunner,
};
use tddflow::workflow::WorkflowConfig;
use tddflow::{Error, Result};

/// Agent that replays queued responses in order.
///
/// Once the queue is drained it answers with an empty string. Every
/// prompt it receives is recorded.
pub struct ScriptedAgent {
    name: String,
    outputs: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    chunked: bool,
}

impl ScriptedAgent {
    pub fn new(name: &str, outputs: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outputs: Mutex::new(outputs.into_iter().map(|o| Ok(o.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
            chunked: false,
        })
    }

    /// Like `new`, but streams each response line by line.
    pub fn streaming(name: &str, outputs: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outputs: Mutex::new(outputs.into_iter().map(|o| Ok(o.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
            chunked: true,
        })
    }

    /// Agent whose first call fails with a transport error.
    pub fn failing(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outputs: Mutex::new(VecDeque::from([Err(Error::agent(name, message))])),
            prompts: Mutex::new(Vec::new()),
            chunked: false,
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    async fn stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate(prompt).await?;
        if !self.chunked {
            return Ok(stream::once(async move { Ok(text) }).boxed());
        }
        let chunks: Vec<Result<String>> = text.split_inclusive('\n').map(|l| Ok(l.to_string())).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// One scripted test run.
pub enum RunnerStep {
    Report(TestRunReport),
    /// Sleep this long, then report success.
    Hang(Duration),
    Fail(String),
}

/// Test runner that replays scripted steps; passes once drained.
pub struct ScriptedRunner {
    steps: Mutex<VecDeque<RunnerStep>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(steps: Vec<RunnerStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always_passing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestRunner for ScriptedRunner {
    async fn run_tests(&self, _tests: &CodeFiles, _implementation: &CodeFiles) -> Result<TestRunReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(RunnerStep::Report(report)) => Ok(report),
            Some(RunnerStep::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(passing_report())
            }
            Some(RunnerStep::Fail(message)) => Err(Error::TestRunner(message)),
            None => Ok(passing_report()),
        }
    }
}

pub fn passing_report() -> TestRunReport {
    TestRunReport::new(vec![
        TestResult::passed("test_app.py", "test_add"),
        TestResult::passed("test_app.py", "test_list"),
    ])
}

pub fn failing_report(test_name: &str, message: &str) -> TestRunReport {
    TestRunReport::new(vec![
        TestResult::passed("test_app.py", "test_list"),
        TestResult::failed("test_app.py", test_name, message),
    ])
}

pub const TESTS_OUTPUT: &str = "\
Here are the tests.

```python
from app import add

def test_add():
    assert add(2, 3) == 5
```
";

pub const CODE_OUTPUT: &str = "\
```python
def add(a, b):
    return a + b
```
";

pub const FIXED_CODE_OUTPUT: &str = "\
**FILE:** `app.py`
```python
def add(a, b):
    return int(a) + int(b)
```
";

pub const DESIGN: &str = "\
FEATURE[1]: Task model
Description: Task class with a title
Dependencies: NONE

FEATURE[2]: Add tasks
Description: Add tasks to the list
Dependencies: FEATURE[1]
";

/// Orchestrator over scripted collaborators with an in-memory file store.
pub fn orchestrator(
    tester: Arc<ScriptedAgent>,
    coder: Arc<ScriptedAgent>,
    runner: Arc<ScriptedRunner>,
    files: Arc<MemoryFileManager>,
    max_iterations: u32,
) -> TddOrchestrator {
    let files: Arc<dyn FileManager> = files;
    TddOrchestrator::new(tester, coder, runner, files).with_workflow_config(WorkflowConfig {
        max_iterations,
        test_timeout_secs: 5,
        save_report: false,
        report_dir: None,
    })
}
