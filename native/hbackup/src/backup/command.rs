use std::{borrow::Cow, fmt};

use forensic_adb::UnixPath;
use lazy_regex::{Lazy, Regex, lazy_regex};

/// Words made only of these characters are passed to the shell unquoted
static SAFE_WORD_REGEX: Lazy<Regex> = lazy_regex!(r"^[A-Za-z0-9_@%+=:,./-]+$");

/// Quotes `word` for a POSIX shell. Safe words are returned as-is.
pub fn quote(word: &str) -> Cow<'_, str> {
    if SAFE_WORD_REGEX.is_match(word) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// A single device shell command.
///
/// Every program word, argument and redirect target is quoted when rendered, so values read from
/// the device can be passed without further escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: Vec<String>,
    args: Vec<String>,
    stdout: Option<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: vec![program.into()], args: Vec::new(), stdout: None }
    }

    /// A file utility, run through busybox when one is configured
    pub fn tool(busybox: Option<&str>, name: &str) -> Self {
        let mut program: Vec<String> =
            busybox.filter(|b| !b.is_empty()).map(str::to_owned).into_iter().collect();
        program.push(name.to_owned());
        Self { program, args: Vec::new(), stdout: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &UnixPath) -> Self {
        self.arg(path.display().to_string())
    }

    /// Redirects standard output to `path`
    pub fn stdout_to(mut self, path: &UnixPath) -> Self {
        self.stdout = Some(path.display().to_string());
        self
    }

    /// Name of the invoked utility, without any busybox prefix
    pub fn program(&self) -> &str {
        self.program.last().map(String::as_str).unwrap_or_default()
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn render(&self) -> String {
        let mut words: Vec<Cow<'_, str>> =
            self.program.iter().chain(&self.args).map(|w| quote(w)).collect();
        if let Some(target) = &self.stdout {
            words.push(Cow::Borrowed(">"));
            words.push(quote(target));
        }
        words.join(" ")
    }

    /// The command wrapped in `su -c` so it runs as root
    pub fn as_root(&self) -> String {
        format!("su -c {}", quote(&self.render()))
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
