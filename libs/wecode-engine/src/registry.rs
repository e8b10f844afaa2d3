/// Language Registry - static table of supported languages
///
/// Each descriptor knows the container image, the staged filename, and the
/// build/run command lines for one language. The table is built once at
/// startup and shared read-only across all jobs.
///
/// Three execution shapes are covered:
/// - Interpreted: run the staged file directly
/// - Compiled: build, then run the produced binary
/// - Compiled with named entry point: the filename must match the declared
///   public class, discovered from the source text
use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use tracing::debug;
use wecode_common::config::EngineConfig;

/// Fixed mount point of the job workspace inside every container
pub const CONTAINER_WORKDIR: &str = "/usr/src/app";

/// Staged stdin file, relative to the workspace
pub const STDIN_FILENAME: &str = "input.txt";

/// Written by the chained command once the build step succeeds
pub const BUILD_MARKER: &str = ".build-ok";

/// Entry point used when no public class declaration is found
pub const DEFAULT_ENTRY_POINT: &str = "Main";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    pub cpus: f64,
}

impl ResourceLimits {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            memory_mb: config.memory_mb,
            cpus: config.cpus,
        }
    }
}

/// How the staged source file is named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFile {
    /// Always the same name
    Fixed(&'static str),
    /// `<entry point>.<extension>`, entry point discovered from the source
    EntryPoint { extension: &'static str },
}

/// Static metadata describing how to stage, build, and run one language.
///
/// Command templates may use `{dir}` (container workdir), `{source}` (staged
/// file path inside the container), `{stdin}` (staged stdin path) and
/// `{entry}` (discovered entry point).
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageDescriptor {
    pub id: &'static str,
    pub image: &'static str,
    pub source_file: SourceFile,
    pub build: Option<&'static str>,
    pub run: &'static str,
    pub limits: ResourceLimits,
}

impl LanguageDescriptor {
    pub fn is_compiled(&self) -> bool {
        self.build.is_some()
    }

    /// Entry point for this source, if the language needs one
    pub fn entry_point(&self, source: &str) -> Option<String> {
        match self.source_file {
            SourceFile::Fixed(_) => None,
            SourceFile::EntryPoint { .. } => Some(discover_entry_point(source)),
        }
    }

    /// Name of the staged source file for this submission
    pub fn source_filename(&self, source: &str) -> String {
        match self.source_file {
            SourceFile::Fixed(name) => name.to_string(),
            SourceFile::EntryPoint { extension } => {
                format!("{}.{}", discover_entry_point(source), extension)
            }
        }
    }

    /// The single shell command run inside the container.
    ///
    /// For compiled languages the build step gates the run step, and the
    /// build marker is written in between so a failed build can be told apart
    /// from a failed run after the fact.
    pub fn shell_command(&self, source: &str) -> String {
        let filename = self.source_filename(source);
        let entry = self
            .entry_point(source)
            .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());
        let render = |template: &str| {
            template
                .replace("{source}", &format!("{}/{}", CONTAINER_WORKDIR, filename))
                .replace("{stdin}", &format!("{}/{}", CONTAINER_WORKDIR, STDIN_FILENAME))
                .replace("{entry}", &entry)
                .replace("{dir}", CONTAINER_WORKDIR)
        };

        match self.build {
            Some(build) => format!(
                "{} && touch {}/{} && {}",
                render(build),
                CONTAINER_WORKDIR,
                BUILD_MARKER,
                render(self.run)
            ),
            None => render(self.run),
        }
    }
}

/// Find the name of the first `public class` declared in `source`.
///
/// Matches `public`, any of `final`/`abstract`/`static`/`strictfp`, then
/// `class` and an identifier. Returns [`DEFAULT_ENTRY_POINT`] when nothing
/// matches so the staged file is never left unnamed.
///
/// Identifiers are limited to `[A-Za-z0-9_]` because the name is spliced
/// unquoted into the container's `sh -c` command line.
pub fn discover_entry_point(source: &str) -> String {
    let tokens: Vec<&str> = source.split_whitespace().collect();

    for (idx, token) in tokens.iter().enumerate() {
        if *token != "public" {
            continue;
        }
        let mut rest = tokens[idx + 1..].iter();
        let mut next = rest.next();
        while let Some(&modifier) = next {
            if matches!(modifier, "final" | "abstract" | "static" | "strictfp") {
                next = rest.next();
            } else {
                break;
            }
        }
        if next != Some(&"class") {
            continue;
        }
        if let Some(name) = rest.next().and_then(|raw| leading_identifier(raw)) {
            debug!(entry_point = name, "Discovered entry point");
            return name.to_string();
        }
    }

    debug!(entry_point = DEFAULT_ENTRY_POINT, "No public class found, using default entry point");
    DEFAULT_ENTRY_POINT.to_string()
}

fn leading_identifier(raw: &str) -> Option<&str> {
    let end = raw
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    let ident = &raw[..end];
    match ident.chars().next() {
        Some(first) if !first.is_ascii_digit() => Some(ident),
        _ => None,
    }
}

/// Read-only registry of language descriptors
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    descriptors: BTreeMap<&'static str, LanguageDescriptor>,
}

impl LanguageRegistry {
    /// The built-in table, every language capped at `limits`
    pub fn builtin(limits: ResourceLimits) -> Self {
        let descriptors = [
            LanguageDescriptor {
                id: "javascript",
                image: "node:18",
                source_file: SourceFile::Fixed("userCode.js"),
                build: None,
                run: "node {source} < {stdin}",
                limits,
            },
            LanguageDescriptor {
                id: "python",
                image: "python:3.9",
                source_file: SourceFile::Fixed("userCode.py"),
                build: None,
                run: "python {source} < {stdin}",
                limits,
            },
            LanguageDescriptor {
                id: "cpp",
                image: "gcc:11",
                source_file: SourceFile::Fixed("userCode.cpp"),
                build: Some("g++ {source} -o {dir}/a.out"),
                run: "{dir}/a.out < {stdin}",
                limits,
            },
            LanguageDescriptor {
                id: "java",
                image: "eclipse-temurin:17",
                source_file: SourceFile::EntryPoint { extension: "java" },
                build: Some("javac {source}"),
                run: "java -cp {dir} {entry} < {stdin}",
                limits,
            },
        ];

        Self {
            descriptors: descriptors.into_iter().map(|d| (d.id, d)).collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::builtin(ResourceLimits::from_config(config))
    }

    /// Look up a language by identifier
    pub fn resolve(&self, language: &str) -> Result<&LanguageDescriptor> {
        self.descriptors
            .get(language.trim())
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))
    }

    /// Supported language identifiers, sorted
    pub fn ids(&self) -> Vec<&'static str> {
        self.descriptors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LanguageRegistry {
        LanguageRegistry::builtin(ResourceLimits {
            memory_mb: 256,
            cpus: 1.0,
        })
    }

    #[test]
    fn test_builtin_languages() {
        assert_eq!(registry().ids(), vec!["cpp", "java", "javascript", "python"]);
    }

    #[test]
    fn test_resolve_unknown_language() {
        let err = registry().resolve("cobol").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage(ref l) if l == "cobol"));
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        assert!(registry().resolve("Python").is_err());
        assert!(registry().resolve(" python ").is_ok());
    }

    #[test]
    fn test_interpreted_command() {
        let reg = registry();
        let python = reg.resolve("python").unwrap();
        assert!(!python.is_compiled());
        assert_eq!(python.source_filename("print(1)"), "userCode.py");
        assert_eq!(
            python.shell_command("print(1)"),
            "python /usr/src/app/userCode.py < /usr/src/app/input.txt"
        );
    }

    #[test]
    fn test_compiled_command_gates_run_on_build() {
        let reg = registry();
        let cpp = reg.resolve("cpp").unwrap();
        assert_eq!(
            cpp.shell_command(""),
            "g++ /usr/src/app/userCode.cpp -o /usr/src/app/a.out \
             && touch /usr/src/app/.build-ok \
             && /usr/src/app/a.out < /usr/src/app/input.txt"
        );
    }

    #[test]
    fn test_java_uses_discovered_class() {
        let reg = registry();
        let java = reg.resolve("java").unwrap();
        let source = "public class Solution {\n  public static void main(String[] a) {}\n}";
        assert_eq!(java.source_filename(source), "Solution.java");
        assert_eq!(
            java.shell_command(source),
            "javac /usr/src/app/Solution.java \
             && touch /usr/src/app/.build-ok \
             && java -cp /usr/src/app Solution < /usr/src/app/input.txt"
        );
    }

    #[test]
    fn test_discover_entry_point_variants() {
        assert_eq!(discover_entry_point("public class Foo {}"), "Foo");
        assert_eq!(discover_entry_point("public class Foo{}"), "Foo");
        assert_eq!(discover_entry_point("public   final\nclass\tBar extends X {}"), "Bar");
        assert_eq!(discover_entry_point("class Helper {}\npublic class Main2 {}"), "Main2");
        assert_eq!(discover_entry_point("public interface Shape {}\npublic class Box {}"), "Box");
        assert_eq!(discover_entry_point("public class Odd_1<T> {}"), "Odd_1");
    }

    #[test]
    fn test_discover_entry_point_fallback() {
        assert_eq!(discover_entry_point(""), DEFAULT_ENTRY_POINT);
        assert_eq!(discover_entry_point("class Hidden {}"), DEFAULT_ENTRY_POINT);
        assert_eq!(discover_entry_point("public class 9Bad {}"), DEFAULT_ENTRY_POINT);
        assert_eq!(discover_entry_point("public class"), DEFAULT_ENTRY_POINT);
        assert_eq!(discover_entry_point("public class $Odd_1<T> {}"), DEFAULT_ENTRY_POINT);
        assert_eq!(discover_entry_point("public class `id` {}"), DEFAULT_ENTRY_POINT);
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_filename_survives_shell() {
        let reg = registry();
        let java = reg.resolve("java").unwrap();

        for source in [
            "public class Solution {}",
            "public class Odd_1<T> {}",
            "public class $Odd_1<T> {}",
            "public class A$B {}",
        ] {
            let filename = java.source_filename(source);
            let command = java.shell_command(source);
            let build = command.split(" && ").next().unwrap();

            let echoed = std::process::Command::new("sh")
                .arg("-c")
                .arg(format!("echo {}", build))
                .output()
                .unwrap();
            let seen = String::from_utf8(echoed.stdout).unwrap();

            assert_eq!(
                seen.trim_end(),
                format!("javac /usr/src/app/{}", filename),
                "source: {}",
                source
            );
        }
    }

    #[test]
    fn test_limits_propagate() {
        let reg = LanguageRegistry::builtin(ResourceLimits {
            memory_mb: 64,
            cpus: 0.25,
        });
        for id in reg.ids() {
            assert_eq!(reg.resolve(id).unwrap().limits.memory_mb, 64);
        }
    }
}
