pub(crate) mod block;
pub(crate) mod heap;
pub(crate) mod integration;
pub(crate) mod stats;
pub(crate) mod vm;

#[cfg(test)]
crate::sync::static_sync! {
    pub static TEST_MUTEX: crate::sync::RwLock<()> = crate::sync::RwLock::new(());
}
