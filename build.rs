use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding this crate's Rust sources. Nothing outside them is policed.
const SOURCE_DIRS: [&str; 8] = [
    "src", "shared", "panel", "backtest", "sources", "cli", "tests", "benches",
];

// Words that record edit history instead of describing code. Matched case-sensitively.
const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

// Which policy a collector enforces; selects the wording of its error message.
#[derive(Clone, Copy)]
enum Policy {
    UnderscorePrefix,
    ForbiddenComment,
    UppercaseComment,
    AllowDeadCode,
}

impl Policy {
    fn headline(self) -> &'static str {
        match self {
            Policy::UnderscorePrefix => "underscore-prefixed variables",
            Policy::ForbiddenComment => "forbidden comment patterns",
            Policy::UppercaseComment => "comments with all uppercase alphabetic characters",
            Policy::AllowDeadCode => "#[allow(dead_code)] attributes",
        }
    }

    fn guidance(self) -> String {
        match self {
            Policy::UnderscorePrefix => {
                "\n⚠️ Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely.\n".to_string()
            }
            Policy::ForbiddenComment => format!(
                "\n⚠️ Comments containing {} are STRICTLY FORBIDDEN in this project.\n   The '**' pattern is not allowed in regular comments (but is allowed in doc comments).\n   Remove them completely rather than commenting them out.\n",
                FORBIDDEN_WORDS.map(|w| format!("'{w}'")).join(", ")
            ),
            Policy::UppercaseComment => {
                "\n⚠️ Comments where all alphabetic characters are uppercase are STRICTLY FORBIDDEN in this project.\n   STRONGLY CONSIDER deleting the comment completely.\n".to_string()
            }
            Policy::AllowDeadCode => {
                "\n⚠️ #[allow(dead_code)] attributes are STRICTLY FORBIDDEN in this project.\n   Either use the code (removing the attribute) or remove it completely.\n".to_string()
            }
        }
    }
}

// A grep sink collecting every offending line of one file, filtered per policy.
struct ViolationCollector {
    policy: Policy,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(policy: Policy, file_path: &Path) -> Self {
        Self {
            policy,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.policy.headline(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&self.policy.guidance());
        Some(error_msg)
    }

    fn is_violation(&self, line_text: &str) -> bool {
        match self.policy {
            Policy::UnderscorePrefix => !is_comment_or_string_match(line_text),
            Policy::ForbiddenComment => {
                // Stars are tolerated in doc comments, unless the line also holds a forbidden word.
                !(is_doc_comment(line_text)
                    && line_text.contains("**")
                    && !FORBIDDEN_WORDS.iter().any(|w| line_text.contains(w)))
            }
            Policy::UppercaseComment => comment_text(line_text).is_some_and(|text| {
                let alpha: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
                !alpha.is_empty() && alpha.iter().all(|c| c.is_uppercase())
            }),
            Policy::AllowDeadCode => true,
        }
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

// Underscore matches inside comments or quoted text are not bindings.
fn is_comment_or_string_match(line_text: &str) -> bool {
    let is_pure_comment = line_text.trim_start().starts_with("//")
        || (line_text.contains("/*") && !line_text.contains("*/let"));

    let is_in_string = line_text
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));

    is_pure_comment || is_in_string
}

fn is_doc_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("///") || trimmed.starts_with("//!")
}

// The text of a comment line without its opening marker, or None for code lines.
fn comment_text(line_text: &str) -> Option<&str> {
    let trimmed = line_text.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("///")
        .or_else(|| trimmed.strip_prefix("//!"))
        .or_else(|| trimmed.strip_prefix("//"))
    {
        return Some(rest.trim());
    }
    let idx = line_text.find("/*")?;
    let body = &line_text[idx + 2..];
    Some(match body.find("*/") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    })
}

// Every .rs file under the crate's source directories, plus build.rs when requested.
fn rust_sources(include_build_script: bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = SOURCE_DIRS
        .iter()
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect();
    if include_build_script {
        files.push(PathBuf::from("build.rs"));
    }
    files
}

fn scan(policy: Policy, pattern: &str, include_build_script: bool) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();

    for path in rust_sources(include_build_script) {
        let mut collector = ViolationCollector::new(policy, &path);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    manually_check_for_unused_variables();

    let forbidden_words_pattern = format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|"));
    let checks = [
        (Policy::UnderscorePrefix, r"\b(_[a-zA-Z0-9_]+)\b".to_string(), true),
        (Policy::ForbiddenComment, forbidden_words_pattern, false),
        (Policy::ForbiddenComment, r"(//|/\*).*\*\*".to_string(), false),
        (Policy::UppercaseComment, r"(//|/\*).*".to_string(), false),
        (
            Policy::AllowDeadCode,
            r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            false,
        ),
    ];

    for (policy, pattern, include_build_script) in checks {
        if let Err(e) = scan(policy, &pattern, include_build_script) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

// Compiles this script with strict lints so it follows the same policy it enforces.
fn manually_check_for_unused_variables() {
    let build_path = Path::new("build.rs");
    let Some(build_path) = build_path.to_str() else {
        return;
    };
    let output = std::process::Command::new("rustc")
        .args([
            "--edition",
            "2021",
            "-D",
            "unused_variables",
            "-D",
            "dead_code",
            "-D",
            "unused_imports",
            "--crate-type",
            "bin",
            "--error-format",
            "human",
            "--emit",
            "metadata",
            "-o",
            "/dev/null",
            build_path,
        ])
        .output();

    match output {
        Ok(output) if !output.status.success() => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let finding = if stderr.contains("unused variable") {
                Some(("Unused variables", "Either use the variable or remove it completely. Underscore prefixes are NOT allowed."))
            } else if stderr.contains("is never used") {
                Some(("Unused functions", "Either use the function or remove it completely."))
            } else if stderr.contains("unused import") {
                Some(("Unused imports", "Either use the imported item or remove the import completely."))
            } else {
                None
            };
            if let Some((what, advice)) = finding {
                eprintln!("\n❌ ERROR: {what} detected in build.rs!");
                eprintln!("{stderr}");
                eprintln!("\n⚠️ {what} are STRICTLY FORBIDDEN in this project.");
                eprintln!("   {advice}");
                std::process::exit(1);
            }
        }
        Ok(_) => {}
        Err(_) => {
            println!(
                "cargo:warning=Could not check for unused variables/functions/imports in build.rs"
            );
        }
    }
}
