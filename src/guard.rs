/// Row-count policy checked after every appended row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimitGuard {
    max_rows: usize,
}

impl RowLimitGuard {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// `true` to keep going, `false` once `count` exceeds the maximum.
    ///
    /// With a maximum of 0 the first appended row already breaches.
    #[inline]
    pub fn allows(&self, count: usize) -> bool {
        count <= self.max_rows
    }
}
