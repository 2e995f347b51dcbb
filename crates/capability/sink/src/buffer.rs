//! Line Protocol 批量缓冲。
//!
//! 行数达到上限或距上次刷写超过间隔时交出整批。

use std::time::{Duration, Instant};

pub struct BatchBuffer {
    lines: Vec<String>,
    max_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl BatchBuffer {
    pub fn new(max_size: usize, flush_interval: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            lines: Vec::with_capacity(max_size),
            max_size,
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    /// 追加一行；缓冲区满时返回整批。
    pub fn add(&mut self, line: String) -> Option<Vec<String>> {
        self.lines.push(line);
        if self.lines.len() >= self.max_size {
            Some(self.flush())
        } else {
            None
        }
    }

    /// 是否到了按时间刷写的时机。
    pub fn should_flush(&self) -> bool {
        !self.lines.is_empty() && self.last_flush.elapsed() >= self.flush_interval
    }

    pub fn flush(&mut self) -> Vec<String> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
