//! Allocator seams for the two identifiers a VPS needs before creation:
//! a cluster-unique vmid and a customer-facing address. Both are traits
//! so a DB-backed reservation scheme or a real IPAM can slot in later.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Hands out cluster-unique vmids.
#[async_trait]
pub trait VmidAllocator: Send + Sync + 'static {
    async fn allocate(&self) -> Result<u32>;
}

/// Monotonic in-process sequence. Seeded above every vmid already known
/// at startup, so it never re-issues an id the cluster has seen.
pub struct SequentialVmidAllocator {
    next: AtomicU32,
}

impl SequentialVmidAllocator {
    pub fn new(start: u32) -> Self {
        Self {
            next: AtomicU32::new(start),
        }
    }

    /// Seed from known vmids, never starting below `floor`.
    pub fn seeded(existing: impl IntoIterator<Item = u32>, floor: u32) -> Self {
        let max = existing.into_iter().max().unwrap_or(0);
        Self::new(max.max(floor) + 1)
    }
}

#[async_trait]
impl VmidAllocator for SequentialVmidAllocator {
    async fn allocate(&self) -> Result<u32> {
        Ok(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Claims and releases customer-facing addresses.
#[async_trait]
pub trait AddressAllocator: Send + Sync + 'static {
    async fn claim(&self) -> Result<Ipv4Addr>;
    async fn release(&self, addr: Ipv4Addr);
}

/// Fixed pool of addresses with claim/release tracking. The lowest free
/// address wins, so allocation order is deterministic.
pub struct StaticAddressPool {
    free: Mutex<BTreeSet<Ipv4Addr>>,
}

impl StaticAddressPool {
    pub fn new(addrs: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            free: Mutex::new(addrs.into_iter().collect()),
        }
    }

    /// Parse a comma-separated address list, e.g.
    /// `192.168.1.100,192.168.1.101`.
    pub fn parse(raw: &str) -> Result<Vec<Ipv4Addr>> {
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse()
                    .map_err(|_| Error::InvalidAddress(s.to_string()))
            })
            .collect()
    }

    /// Take an address out of the free set without claiming it, used to
    /// seed the pool minus addresses already assigned in the durable store.
    pub async fn remove(&self, addr: Ipv4Addr) -> bool {
        self.free.lock().await.remove(&addr)
    }

    pub async fn free_count(&self) -> usize {
        self.free.lock().await.len()
    }
}

#[async_trait]
impl AddressAllocator for StaticAddressPool {
    async fn claim(&self) -> Result<Ipv4Addr> {
        self.free
            .lock()
            .await
            .pop_first()
            .ok_or(Error::AddressPoolExhausted)
    }

    async fn release(&self, addr: Ipv4Addr) {
        self.free.lock().await.insert(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vmid_sequence_is_monotonic_and_unique() {
        let alloc = SequentialVmidAllocator::new(100);
        let a = alloc.allocate().await.unwrap();
        let b = alloc.allocate().await.unwrap();
        let c = alloc.allocate().await.unwrap();
        assert_eq!((a, b, c), (100, 101, 102));
    }

    #[tokio::test]
    async fn vmid_seed_starts_above_existing_and_floor() {
        let alloc = SequentialVmidAllocator::seeded([105, 250, 110], 1000);
        assert_eq!(alloc.allocate().await.unwrap(), 1001);

        let alloc = SequentialVmidAllocator::seeded([1500, 1200], 1000);
        assert_eq!(alloc.allocate().await.unwrap(), 1501);

        let alloc = SequentialVmidAllocator::seeded([], 1000);
        assert_eq!(alloc.allocate().await.unwrap(), 1001);
    }

    #[tokio::test]
    async fn pool_claims_lowest_and_tracks_releases() {
        let pool = StaticAddressPool::new(
            StaticAddressPool::parse("192.168.1.101, 192.168.1.100").unwrap(),
        );

        let first = pool.claim().await.unwrap();
        assert_eq!(first, "192.168.1.100".parse::<Ipv4Addr>().unwrap());

        let second = pool.claim().await.unwrap();
        assert_eq!(second, "192.168.1.101".parse::<Ipv4Addr>().unwrap());

        assert!(matches!(
            pool.claim().await,
            Err(Error::AddressPoolExhausted)
        ));

        pool.release(first).await;
        assert_eq!(pool.claim().await.unwrap(), first);
    }

    #[tokio::test]
    async fn pool_seeding_removes_assigned_addresses() {
        let pool = StaticAddressPool::new(
            StaticAddressPool::parse("10.0.0.1,10.0.0.2").unwrap(),
        );
        assert!(pool.remove("10.0.0.1".parse().unwrap()).await);
        assert!(!pool.remove("10.0.0.9".parse().unwrap()).await);
        assert_eq!(pool.free_count().await, 1);
        assert_eq!(
            pool.claim().await.unwrap(),
            "10.0.0.2".parse::<Ipv4Addr>().unwrap()
        );
    }

    #[test]
    fn pool_parse_rejects_garbage() {
        assert!(StaticAddressPool::parse("10.0.0.1,not-an-ip").is_err());
        assert_eq!(StaticAddressPool::parse("").unwrap(), Vec::<Ipv4Addr>::new());
    }
}
