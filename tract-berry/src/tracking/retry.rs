//! 膨胀重试的有界状态机.
//!
//! 第 `i` 次尝试使用膨胀级别 `base + i`. 一旦某次尝试的接受条数达到目标即停止;
//! 预算耗尽时保留接受条数最多的那一次 (相同时保留较早的一次).

use crate::config::TrackingConfig;
use crate::Point3;

/// 一次尝试的结果.
#[derive(Clone, Debug, PartialEq)]
pub struct Attempt {
    /// 尝试序号, 从 0 开始.
    pub index: usize,

    /// 纤维束掩膜膨胀次数.
    pub bundle_dilation: usize,

    /// 端点掩膜膨胀次数.
    pub endpoint_dilation: usize,

    /// 种子数.
    pub seed_count: usize,

    /// 通过过滤的纤维 (体素坐标).
    pub accepted: Vec<Vec<Point3>>,
}

/// 重试状态.
#[derive(Clone, Debug)]
pub struct RetryState {
    target: usize,
    max_attempts: usize,
    done: usize,
    best: Option<Attempt>,
}

impl RetryState {
    /// 按 `config` 的预算与目标条数初始化.
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            target: config.target_fibers,
            max_attempts: config.retry.max_attempts.max(1),
            done: 0,
            best: None,
        }
    }

    /// 已完成的尝试次数.
    #[inline]
    pub fn attempts(&self) -> usize {
        self.done
    }

    /// 是否已经达到目标?
    #[inline]
    pub fn reached_target(&self) -> bool {
        self.best
            .as_ref()
            .map_or(false, |b| b.accepted.len() >= self.target)
    }

    /// 下一次尝试的序号. 已达到目标或预算耗尽时返回 `None`.
    #[inline]
    pub fn next_attempt(&self) -> Option<usize> {
        (!self.reached_target() && self.done < self.max_attempts).then_some(self.done)
    }

    /// 记录一次尝试.
    pub fn record(&mut self, attempt: Attempt) {
        debug_assert_eq!(Some(attempt.index), self.next_attempt());
        self.done += 1;
        let better = self
            .best
            .as_ref()
            .map_or(true, |b| attempt.accepted.len() > b.accepted.len());
        if better {
            self.best = Some(attempt);
        }
    }

    /// 结束, 返回最佳尝试 (截断到目标条数) 与尝试次数. 一次都没尝试时返回 `None`.
    pub fn finish(self) -> Option<(Attempt, usize)> {
        let mut best = self.best?;
        best.accepted.truncate(self.target);
        Some((best, self.done))
    }
}
