#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::{grade::diagnostics::JavacDiagnostic, types::LineRef};

peg::parser! {
    /// includes some useful grammars for parsing javac and JVM outputs.
    pub grammar parser() for str {
        /// matches any sequence of 1 or more numbers
        rule number() -> u32
            = n:$(['0'..='9']+) {? n.parse().or(Err("u32")) }

        /// matches any number of whitespace characters
        rule whitespace() = quiet!{[' ' | '\n' | '\t' | '\r']+}

        /// matches any path separator, hopefully cross-platform
        rule path_separator() =
            whitespace()?
            "."?
            "/" / "\\" / "\\\\"
            whitespace()?

        /// matches any sequence of upper and lowercase alphabets
        rule word() -> String
            = whitespace()?
                w:[
                    'a'..='z' |
                    'A'..='Z' |
                    '0'..='9' |
                    '-' | '.' | ' ' |
                    '[' | ']' | '_'
                ]+
                whitespace()?
            { w.iter().collect::<String>() }

        /// matches any valid path, hopefully
        rule path() -> String
            = whitespace()?
              path_separator()?
              p:(word() ++ path_separator())
              whitespace()?
            { p.iter().fold(String::new(), |acc, w| format!("{acc}/{w}")) }

        /// matches line numbers (colon followed by numbers, eg. :23)
        rule line_number() -> u32
            = ":" n:number() ":" whitespace()? { n }

        /// matches "error" or "warning", returns true if error
        rule diag_type() -> bool
            = whitespace()?
              a:"error"? b:"warning"?
              ":"
              whitespace()?
            { a.is_some() }

        /// matches anything, placed where diagnostic should be
        rule diagnostic() -> String
            = a:([_]+)
            { a.iter().collect::<String>() }

        /// parses the first line of a javac diagnostic message and returns a `JavacDiagnostic`
        pub rule parse_diag() -> JavacDiagnostic
            = p:path() l:line_number() d:diag_type() m:diagnostic()
            {
                let p = std::path::PathBuf::from(p);
                let name = p
                    .file_name()
                    .map(|value| value.to_string_lossy().to_string())
                    .unwrap_or_else(|| p.display().to_string());
                let display_path = format!(".{}", p.display());

                JavacDiagnostic::builder()
                    .path(display_path)
                    .file_name(name)
                    .severity(d)
                    .line_number(l)
                    .message(m.trim().to_string())
                    .build()
            }

        /// Parses a word in a JVM stacktrace
        rule stacktrace_word() -> String
            = whitespace()?
            w:[
                'a'..='z' |
                'A'..='Z' |
                '0'..='9' |
                '-' | '.' | ' ' |
                '[' | ']' | '/' |
                '<' | '>' | '=' | '$' | '_'
            ]+
            whitespace()?
        { w.iter().collect::<String>() }

        /// Parses a filename from a JVM stacktrace
        rule stacktrace_filename() -> String
            = whitespace()?
            w:[
                'a'..='z' |
                'A'..='Z' |
                '0'..='9' |
                '-' | '_' | '$'
            ]+
            ".java:"
            whitespace()?
        { w.iter().collect::<String>() }

        /// Parses a LineRef from a JVM stacktrace frame such as
        /// `at Main.main(Main.java:5)`
        pub rule stacktrace_line_ref() -> LineRef
            = whitespace()?
            stacktrace_word()*
            whitespace()?
            "("
            c:stacktrace_filename()
            d:number()
            whitespace()?
            ")"
            whitespace()?
            {
                LineRef { line_number: d as usize, file_name: format!("{c}.java") }
            }

        /// Parses the header line of an uncaught exception and returns the
        /// exception class with its message
        pub rule uncaught_exception() -> String
            = whitespace()?
            "Exception in thread"
            whitespace()
            "\"" [^'"']* "\""
            whitespace()
            d:diagnostic()
            { d.trim().to_string() }
    }
}

/// Parses every javac diagnostic header found in `output`, skipping the
/// source excerpt and caret lines javac prints underneath each one.
pub fn javac_diagnostics(output: &str) -> Vec<JavacDiagnostic> {
    output
        .lines()
        .filter_map(|line| parser::parse_diag(line).ok())
        .collect()
}

/// Extracts the stack frames that point into Java sources from JVM stderr.
pub fn stacktrace_line_refs(stderr: &str) -> Vec<LineRef> {
    stderr
        .lines()
        .filter(|line| line.trim_start().starts_with("at "))
        .filter_map(|line| parser::stacktrace_line_ref(line).ok())
        .collect()
}
