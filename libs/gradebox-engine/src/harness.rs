/// Program construction
///
/// Turns a submission into a self-contained [`Program`]: the files to place in
/// the sandbox's working directory, the file to hand to the interpreter and the
/// bytes to feed on stdin.
///
/// Function mode never splices test inputs into source text. Arguments are
/// parsed host-side into JSON values and shipped in `payload.json`; the
/// harness looks up the declared entry point and calls it with them. The
/// runners delete `payload.json` before the submission is loaded, so the
/// run's nonce is not on disk while user code executes.
use gradebox_common::types::{EntryPoint, Language, TestCase};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PAYLOAD_FILE: &str = "payload.json";

const JS_FUNCTION_RUNNER: &str = include_str!("../harness/function_runner.js");
const PY_FUNCTION_RUNNER: &str = include_str!("../harness/function_runner.py");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramFile {
    pub name: String,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub language: Language,
    pub files: Vec<ProgramFile>,
    /// File passed to the interpreter
    pub entry_file: String,
    pub stdin: String,
}

impl Program {
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|file| file.name == name)
            .map(|file| file.contents.as_str())
    }

    /// Bytes shipped into the sandbox, stdin included
    pub fn payload_size(&self) -> usize {
        self.files.iter().map(|f| f.contents.len()).sum::<usize>() + self.stdin.len()
    }
}

/// One call of the entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInvocation {
    /// Position of the test case in the challenge
    pub index: usize,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessPayload {
    pub nonce: String,
    pub entry: String,
    pub cases: Vec<CaseInvocation>,
}

/// Parse a test-case input such as `2, 3` or `"abc"` into call arguments.
///
/// The input is read as the inside of a JSON array. Anything that is not
/// literal data (prose descriptions, expressions) yields `None`.
pub fn parse_arguments(input: &str) -> Option<Vec<Value>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    serde_json::from_str::<Vec<Value>>(&format!("[{}]", trimmed)).ok()
}

/// Map each test case to an invocation, `None` where the input cannot be
/// turned into exactly `entry.arity` arguments
pub fn plan_invocations(test_cases: &[TestCase], entry: &EntryPoint) -> Vec<Option<CaseInvocation>> {
    test_cases
        .iter()
        .enumerate()
        .map(|(index, test_case)| {
            parse_arguments(&test_case.input)
                .filter(|args| args.len() == entry.arity)
                .map(|args| CaseInvocation { index, args })
        })
        .collect()
}

pub fn submission_file(language: Language) -> String {
    format!("submission.{}", language.extension())
}

/// Harness program that calls `entry` once per invocation
pub fn function_program(
    language: Language,
    source: &str,
    entry: &EntryPoint,
    invocations: Vec<CaseInvocation>,
    nonce: &str,
) -> Result<Program, serde_json::Error> {
    let payload = HarnessPayload {
        nonce: nonce.to_string(),
        entry: entry.name.clone(),
        cases: invocations,
    };
    let runner = match language {
        Language::JavaScript => JS_FUNCTION_RUNNER,
        Language::Python => PY_FUNCTION_RUNNER,
    };
    let entry_file = format!("runner.{}", language.extension());

    Ok(Program {
        language,
        files: vec![
            ProgramFile {
                name: submission_file(language),
                contents: source.to_string(),
            },
            ProgramFile {
                name: PAYLOAD_FILE.to_string(),
                contents: serde_json::to_string(&payload)?,
            },
            ProgramFile {
                name: entry_file.clone(),
                contents: runner.to_string(),
            },
        ],
        entry_file,
        stdin: String::new(),
    })
}

/// The submission run as a plain script with `stdin` as its input
pub fn script_program(language: Language, source: &str, stdin: &str) -> Program {
    let entry_file = format!("main.{}", language.extension());
    let mut stdin = stdin.to_string();
    if !stdin.is_empty() && !stdin.ends_with('\n') {
        stdin.push('\n');
    }
    Program {
        language,
        files: vec![ProgramFile {
            name: entry_file.clone(),
            contents: source.to_string(),
        }],
        entry_file,
        stdin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("2, 3"), Some(vec![json!(2), json!(3)]));
        assert_eq!(parse_arguments("-1, 4"), Some(vec![json!(-1), json!(4)]));
        assert_eq!(parse_arguments("\"abc\""), Some(vec![json!("abc")]));
        assert_eq!(
            parse_arguments("[64, 34, 25]"),
            Some(vec![json!([64, 34, 25])])
        );
        assert_eq!(parse_arguments(""), Some(vec![]));
        assert_eq!(parse_arguments("   "), Some(vec![]));
    }

    #[test]
    fn test_parse_arguments_rejects_prose() {
        assert_eq!(parse_arguments("HelloWorld component render"), None);
        assert_eq!(parse_arguments("Alice grades: [85, 92]"), None);
        assert_eq!(parse_arguments("2 + 3"), None);
    }

    #[test]
    fn test_plan_invocations_checks_arity() {
        let cases = vec![
            TestCase::new("2, 3", "5"),
            TestCase::new("2", "2"),
            TestCase::new("not an argument list", "?"),
            TestCase::new("-1, 4", "3"),
        ];
        let plans = plan_invocations(&cases, &EntryPoint::new("add", 2));

        assert_eq!(plans.len(), 4);
        assert_eq!(
            plans[0],
            Some(CaseInvocation {
                index: 0,
                args: vec![json!(2), json!(3)]
            })
        );
        assert_eq!(plans[1], None);
        assert_eq!(plans[2], None);
        assert_eq!(plans[3].as_ref().map(|p| p.index), Some(3));
    }

    #[test]
    fn test_function_program_layout() {
        let invocations = vec![CaseInvocation {
            index: 0,
            args: vec![json!(2), json!(3)],
        }];
        let program = function_program(
            Language::JavaScript,
            "function add(a, b) { return a + b; }",
            &EntryPoint::new("add", 2),
            invocations,
            "n0nce",
        )
        .unwrap();

        assert_eq!(program.entry_file, "runner.js");
        assert_eq!(
            program.file("submission.js"),
            Some("function add(a, b) { return a + b; }")
        );
        assert!(program.file("runner.js").unwrap().contains("payload.json"));

        let payload: HarnessPayload =
            serde_json::from_str(program.file(PAYLOAD_FILE).unwrap()).unwrap();
        assert_eq!(payload.nonce, "n0nce");
        assert_eq!(payload.entry, "add");
        assert_eq!(payload.cases[0].args, vec![json!(2), json!(3)]);
        assert!(program.stdin.is_empty());
    }

    #[test]
    fn test_python_program_uses_python_runner() {
        let program = function_program(
            Language::Python,
            "def f():\n    return 1\n",
            &EntryPoint::new("f", 0),
            Vec::new(),
            "n",
        )
        .unwrap();
        assert_eq!(program.entry_file, "runner.py");
        assert!(program.file("submission.py").is_some());
        assert!(program.file("runner.py").unwrap().contains("def main()"));
    }

    #[test]
    fn test_runners_delete_payload_before_loading_submission() {
        let js = JS_FUNCTION_RUNNER;
        let unlink = js.find("fs.unlinkSync(payloadPath)").unwrap();
        assert!(unlink < js.find("vm.runInContext").unwrap());

        let py = PY_FUNCTION_RUNNER;
        let unlink = py.find("os.unlink(path)").unwrap();
        assert!(unlink < py.find("exec(compile(").unwrap());
    }

    #[test]
    fn test_script_program_terminates_stdin() {
        let program = script_program(Language::Python, "print(input())", "5");
        assert_eq!(program.entry_file, "main.py");
        assert_eq!(program.stdin, "5\n");
        assert_eq!(program.payload_size(), "print(input())".len() + 2);

        let empty = script_program(Language::Python, "print(1)", "");
        assert_eq!(empty.stdin, "");
    }
}
