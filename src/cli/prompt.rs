use std::io::{self, BufRead, IsTerminal, Write};

/// Ask a yes/no question on stderr
///
/// Without an interactive stdin the answer is "no".
pub fn confirm(prompt: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }

    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;

    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        for answer in ["y\n", "Y", " yes \r\n", "YES"] {
            assert!(is_yes(answer), "{answer:?}");
        }
        for answer in ["", "\n", "n", "no", "yep"] {
            assert!(!is_yes(answer), "{answer:?}");
        }
    }
}
