use std::collections::VecDeque;

// Short human-readable record of what went wrong during rendering: contained failures, demoted dispatch candidates, unparsable payloads.
// The renderer never aborts on those, so without this the only trace would be an inline "<...>" marker somewhere deep in a tree.
// Every line also goes to the `log` facade, for hosts that have a real logger set up.
pub struct Log {
    pub lines: VecDeque<String>,
}

pub const MAX_LINES: usize = 100;

impl Log {
    pub fn new() -> Log {
        Log {lines: VecDeque::new()}
    }

    pub fn add_line(&mut self, line: String) {
        ::log::debug!(target: "typeview", "{}", line);
        self.lines.push_back(line);
        while self.lines.len() > MAX_LINES {
            self.lines.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[macro_export]
macro_rules! log {
    ($log:expr, $($arg:tt)*) => (
        ($log).add_line(format!($($arg)*))
    );
}
