use bitflags::bitflags;

bitflags! {
    /// Field groups a backend populates on a returned package.
    ///
    /// Everything outside `BASIC` is loaded on demand; a package handed
    /// out by a store carries exactly the groups that were requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Load: u32 {
        const BASIC = 1 << 0;
        const DEPS = 1 << 1;
        const RDEPS = 1 << 2;
        const OPTIONS = 1 << 3;
        const SHLIBS_REQUIRED = 1 << 4;
        const FILES = 1 << 5;
        const DIRS = 1 << 6;
        const SCRIPTS = 1 << 7;
    }
}
