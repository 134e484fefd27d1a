/// Judge - grades one submission against a problem's ordered test cases
///
/// **Policy:**
/// - Preconditions (problem exists, has test cases, language is launchable)
///   are checked before anything is spawned; violations are CE
/// - Test cases run strictly in stored order, one at a time
/// - The first case that is not a clean pass ends grading (fail-fast);
///   later cases are never executed
/// - `test_cases_passed` counts only the cases before the failing one
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace of expected and actual output
/// - Everything else must match exactly (internal whitespace, case)
use crate::supervisor::{Executor, Supervisor};
use gavel_common::types::{
    ExecutionRequest, ExecutionResult, Problem, RunVerdict, SubmissionVerdict, Verdict,
};
use tracing::{debug, info, instrument};

/// Normalize output for comparison
pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Map a non-passing run to its submission verdict and message
fn run_failure(case_no: usize, result: &ExecutionResult) -> Option<(Verdict, String)> {
    match result.verdict {
        RunVerdict::Ok => None,
        RunVerdict::SetupFailure => Some((
            Verdict::CompilationError,
            format!("Setup failure on test case {}: {}", case_no, result.message),
        )),
        RunVerdict::TimeLimitExceeded => Some((
            Verdict::TimeLimitExceeded,
            format!("Time Limit Exceeded on test case {}", case_no),
        )),
        RunVerdict::MemoryLimitExceeded => Some((
            Verdict::MemoryLimitExceeded,
            format!("Memory Limit Exceeded on test case {}", case_no),
        )),
        RunVerdict::RuntimeError => Some((
            Verdict::RuntimeError,
            format!("Runtime Error on test case {}: {}", case_no, result.message),
        )),
    }
}

/// Running totals while iterating test cases
#[derive(Debug, Default)]
struct Tally {
    passed: u32,
    max_time_ms: u64,
    max_memory_kb: u64,
}

impl Tally {
    fn observe(&mut self, result: &ExecutionResult) {
        self.max_time_ms = self.max_time_ms.max(result.execution_time_ms);
        self.max_memory_kb = self.max_memory_kb.max(result.memory_used_kb);
    }

    fn verdict(&self, verdict: Verdict, message: String, total: u32) -> SubmissionVerdict {
        SubmissionVerdict {
            verdict,
            message,
            test_cases_passed: self.passed,
            total_test_cases: total,
            execution_time_ms: self.max_time_ms,
            memory_used_kb: self.max_memory_kb,
            expected: None,
            actual: None,
        }
    }
}

pub struct Judge<E = Supervisor> {
    executor: E,
}

impl<E: Executor> Judge<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Grade `code` against `problem`. Always returns a complete verdict.
    #[instrument(skip_all, fields(problem_id = problem.map(|p| p.id), language = %language))]
    pub async fn judge(
        &self,
        problem: Option<&Problem>,
        language: &str,
        code: &str,
    ) -> SubmissionVerdict {
        let Some(problem) = problem else {
            return SubmissionVerdict::setup_failure("Problem not found");
        };
        if problem.test_cases.is_empty() {
            return SubmissionVerdict::setup_failure("No test cases found");
        }

        let total = problem.test_cases.len() as u32;
        if !self.executor.supports(language) {
            return SubmissionVerdict {
                total_test_cases: total,
                ..SubmissionVerdict::setup_failure(format!("Unsupported language: {}", language))
            };
        }

        debug!(
            total,
            samples = problem.samples().count(),
            time_limit_ms = problem.time_limit_ms,
            memory_limit_mb = problem.memory_limit_mb,
            "Judging submission"
        );

        let mut tally = Tally::default();

        for (idx, test_case) in problem.test_cases.iter().enumerate() {
            let case_no = idx + 1;
            let request = ExecutionRequest::new(
                code,
                language,
                test_case.input_data.as_str(),
                problem.time_limit_ms,
                problem.memory_limit_mb,
            );

            let result = self.executor.execute(&request).await;
            tally.observe(&result);

            debug!(
                test_case = case_no,
                sample = test_case.is_sample,
                run_verdict = %result.verdict,
                passed = result.passed(),
                execution_time_ms = result.execution_time_ms,
                memory_used_kb = result.memory_used_kb,
                "Test case executed"
            );

            if let Some((verdict, message)) = run_failure(case_no, &result) {
                info!(test_case = case_no, verdict = %verdict, passed = tally.passed, "Submission failed");
                return tally.verdict(verdict, message, total);
            }

            let expected = normalize_output(&test_case.expected_output);
            let actual = normalize_output(&result.stdout);
            if actual != expected {
                info!(test_case = case_no, verdict = %Verdict::WrongAnswer, passed = tally.passed, "Submission failed");
                return SubmissionVerdict {
                    expected: Some(expected.to_string()),
                    actual: Some(actual.to_string()),
                    ..tally.verdict(
                        Verdict::WrongAnswer,
                        format!("Wrong Answer on test case {}", case_no),
                        total,
                    )
                };
            }

            tally.passed += 1;
        }

        info!(
            passed = tally.passed,
            execution_time_ms = tally.max_time_ms,
            memory_used_kb = tally.max_memory_kb,
            "Submission accepted"
        );
        tally.verdict(
            Verdict::Accepted,
            format!("Accepted - All {} test cases passed", total),
            total,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::{LanguageRegistry, LaunchSpec};
    use crate::supervisor::SupervisorSettings;
    use gavel_common::types::TestCase;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Executor that replays canned results and records every request
    struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<ExecutionResult>>,
        calls: Mutex<Vec<ExecutionRequest>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<ExecutionResult>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ExecutionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Executor for ScriptedExecutor {
        fn supports(&self, language: &str) -> bool {
            language == "python"
        }

        async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
            self.calls.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("executor called more often than scripted")
        }
    }

    fn ok(stdout: &str, time_ms: u64, memory_kb: u64) -> ExecutionResult {
        ExecutionResult {
            verdict: RunVerdict::Ok,
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            execution_time_ms: time_ms,
            memory_used_kb: memory_kb,
            message: "Execution completed successfully".to_string(),
        }
    }

    fn failed(verdict: RunVerdict, message: &str) -> ExecutionResult {
        ExecutionResult {
            verdict,
            message: message.to_string(),
            exit_code: None,
            execution_time_ms: 7,
            memory_used_kb: 900,
            ..ok("", 0, 0)
        }
    }

    fn case(input: &str, expected: &str, is_sample: bool) -> TestCase {
        TestCase {
            input_data: input.to_string(),
            expected_output: expected.to_string(),
            is_sample,
        }
    }

    fn two_sum() -> Problem {
        Problem {
            id: 1,
            title: "Two Sum".to_string(),
            time_limit_ms: 1000,
            memory_limit_mb: 128,
            test_cases: vec![
                case("4 9\n2 7 11 15", "0 1", true),
                case("3 6\n3 2 4", "1 2", false),
                case("2 6\n3 3", "0 1", false),
                case("5 8\n1 2 3 4 5", "2 4", false),
            ],
        }
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("\nhello\n"), "hello");
        assert_eq!(normalize_output("0 1\r\n"), "0 1");
        assert_eq!(normalize_output("   "), "");
    }

    #[tokio::test]
    async fn test_all_cases_pass() {
        let executor = ScriptedExecutor::new(vec![
            ok("0 1\n", 12, 3000),
            ok("1 2\n", 30, 2500),
            ok("0 1", 18, 4100),
            ok("2 4\n", 9, 1200),
        ]);
        let judge = Judge::new(executor);

        let verdict = judge.judge(Some(&two_sum()), "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::Accepted);
        assert_eq!(verdict.test_cases_passed, 4);
        assert_eq!(verdict.total_test_cases, 4);
        assert_eq!(verdict.execution_time_ms, 30);
        assert_eq!(verdict.memory_used_kb, 4100);
        assert_eq!(verdict.message, "Accepted - All 4 test cases passed");
        assert!(verdict.expected.is_none());
    }

    #[tokio::test]
    async fn test_requests_follow_problem_order_and_limits() {
        let executor = ScriptedExecutor::new(vec![
            ok("0 1", 1, 1),
            ok("1 2", 1, 1),
            ok("0 1", 1, 1),
            ok("2 4", 1, 1),
        ]);
        let judge = Judge::new(executor);
        let problem = two_sum();

        judge.judge(Some(&problem), "python", "solution").await;

        let calls = judge.executor().calls();
        assert_eq!(calls.len(), 4);
        for (call, test_case) in calls.iter().zip(&problem.test_cases) {
            assert_eq!(call.stdin, test_case.input_data);
            assert_eq!(call.code, "solution");
            assert_eq!(call.language, "python");
            assert_eq!(call.time_limit_ms, 1000);
            assert_eq!(call.memory_limit_mb, 128);
        }
    }

    #[tokio::test]
    async fn test_wrong_answer_short_circuits() {
        let executor = ScriptedExecutor::new(vec![ok("0 1\n", 5, 100), ok("0 1\n", 5, 100)]);
        let judge = Judge::new(executor);

        let verdict = judge.judge(Some(&two_sum()), "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        assert_eq!(verdict.test_cases_passed, 1);
        assert_eq!(verdict.total_test_cases, 4);
        assert_eq!(verdict.message, "Wrong Answer on test case 2");
        assert_eq!(verdict.expected.as_deref(), Some("1 2"));
        assert_eq!(verdict.actual.as_deref(), Some("0 1"));
        assert_eq!(judge.executor().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_kinds_on_case_k() {
        let cases = [
            (RunVerdict::TimeLimitExceeded, Verdict::TimeLimitExceeded, "Time Limit Exceeded on test case 3"),
            (RunVerdict::MemoryLimitExceeded, Verdict::MemoryLimitExceeded, "Memory Limit Exceeded on test case 3"),
            (RunVerdict::RuntimeError, Verdict::RuntimeError, "Runtime Error on test case 3: Runtime Error: boom"),
            (RunVerdict::SetupFailure, Verdict::CompilationError, "Setup failure on test case 3: Runtime Error: boom"),
        ];

        for (run_verdict, expected_verdict, expected_message) in cases {
            let executor = ScriptedExecutor::new(vec![
                ok("0 1", 5, 100),
                ok("1 2", 6, 200),
                failed(run_verdict, "Runtime Error: boom"),
            ]);
            let judge = Judge::new(executor);

            let verdict = judge.judge(Some(&two_sum()), "python", "solution").await;

            assert_eq!(verdict.verdict, expected_verdict);
            assert_eq!(verdict.test_cases_passed, 2);
            assert_eq!(verdict.total_test_cases, 4);
            assert_eq!(verdict.message, expected_message);
            assert!(verdict.expected.is_none());
            // The failing run's figures are part of the maxima
            assert_eq!(verdict.execution_time_ms, 7);
            assert_eq!(verdict.memory_used_kb, 900);
            assert_eq!(judge.executor().calls().len(), 3, "case 4 must never run");
        }
    }

    #[tokio::test]
    async fn test_failure_on_first_case_counts_nothing() {
        let executor = ScriptedExecutor::new(vec![failed(RunVerdict::TimeLimitExceeded, "Time Limit Exceeded")]);
        let judge = Judge::new(executor);

        let verdict = judge.judge(Some(&two_sum()), "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(verdict.test_cases_passed, 0);
        assert_eq!(judge.executor().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_problem_is_ce() {
        let judge = Judge::new(ScriptedExecutor::new(vec![]));

        let verdict = judge.judge(None, "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::CompilationError);
        assert_eq!(verdict.message, "Problem not found");
        assert!(judge.executor().calls().is_empty());
    }

    #[tokio::test]
    async fn test_problem_without_cases_is_ce() {
        let judge = Judge::new(ScriptedExecutor::new(vec![]));
        let problem = Problem {
            test_cases: vec![],
            ..two_sum()
        };

        let verdict = judge.judge(Some(&problem), "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::CompilationError);
        assert_eq!(verdict.message, "No test cases found");
        assert_eq!(verdict.total_test_cases, 0);
        assert!(judge.executor().calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_language_is_ce() {
        let judge = Judge::new(ScriptedExecutor::new(vec![]));

        let verdict = judge.judge(Some(&two_sum()), "brainfuck", "+[]").await;

        assert_eq!(verdict.verdict, Verdict::CompilationError);
        assert_eq!(verdict.message, "Unsupported language: brainfuck");
        assert_eq!(verdict.test_cases_passed, 0);
        assert_eq!(verdict.total_test_cases, 4);
        assert!(judge.executor().calls().is_empty());
    }

    #[tokio::test]
    async fn test_internal_whitespace_matters() {
        let executor = ScriptedExecutor::new(vec![ok("0  1", 5, 100)]);
        let judge = Judge::new(executor);

        let verdict = judge.judge(Some(&two_sum()), "python", "solution").await;

        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        assert_eq!(verdict.test_cases_passed, 0);
        assert_eq!(verdict.actual.as_deref(), Some("0  1"));
    }

    // Real processes through the supervisor, using /bin/sh programs

    const TWO_SUM_SH: &str = r#"exec awk 'NR == 1 { target = $2 }
NR == 2 {
    for (i = 1; i <= NF; i++)
        for (j = i + 1; j <= NF; j++)
            if ($i + $j == target) { print i - 1, j - 1; exit }
}'
"#;

    fn sh_judge() -> Judge {
        let mut registry = LanguageRegistry::empty();
        registry.register(LaunchSpec::new("sh", "main.sh", "sh", &["{file}"]));
        registry.register(LaunchSpec::new("python", "main.py", "python3", &["{file}"]));
        Judge::new(Supervisor::new(Arc::new(registry), SupervisorSettings::default()))
    }

    #[tokio::test]
    async fn test_two_sum_correct_solution_accepted() {
        let judge = sh_judge();

        let verdict = judge.judge(Some(&two_sum()), "sh", TWO_SUM_SH).await;

        assert_eq!(verdict.verdict, Verdict::Accepted, "{}", verdict.message);
        assert_eq!(verdict.test_cases_passed, 4);
        assert_eq!(verdict.total_test_cases, 4);
    }

    #[tokio::test]
    async fn test_two_sum_first_case_only_is_wrong_answer() {
        let judge = sh_judge();

        let verdict = judge.judge(Some(&two_sum()), "sh", "echo 0 1\n").await;

        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        assert_eq!(verdict.test_cases_passed, 1);
        assert_eq!(verdict.total_test_cases, 4);
        assert_eq!(verdict.expected.as_deref(), Some("1 2"));
        assert_eq!(verdict.actual.as_deref(), Some("0 1"));
    }

    #[tokio::test]
    async fn test_time_limit_on_second_case() {
        let judge = sh_judge();
        let problem = Problem {
            time_limit_ms: 300,
            ..two_sum()
        };
        let code = "read n t\nif [ \"$n\" -eq 3 ]; then exec sleep 5; fi\necho 0 1\n";

        let verdict = judge.judge(Some(&problem), "sh", code).await;

        assert_eq!(verdict.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(verdict.test_cases_passed, 1);
        assert_eq!(verdict.message, "Time Limit Exceeded on test case 2");
        assert!(verdict.execution_time_ms >= 300);
    }

    #[tokio::test]
    #[ignore] // Requires python3
    async fn test_two_sum_python_accepted() {
        let judge = sh_judge();
        let code = r#"
n, target = map(int, input().split())
nums = list(map(int, input().split()))
seen = {}
for i, x in enumerate(nums):
    if target - x in seen:
        print(seen[target - x], i)
        break
    seen[x] = i
"#;

        let verdict = judge.judge(Some(&two_sum()), "python", code).await;

        assert_eq!(verdict.verdict, Verdict::Accepted, "{}", verdict.message);
        assert_eq!(verdict.test_cases_passed, 4);
    }
}
