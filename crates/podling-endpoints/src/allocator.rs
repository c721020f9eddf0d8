//! ClusterIP allocation from an IPv4 block.
//!
//! Addresses are tracked as offsets from the block's network address.
//! For blocks shorter than /31 the network and broadcast offsets are never
//! handed out. Allocation scans forward from just past the last issued
//! offset, wrapping at the end of the block, and gives up after
//! `min(usable, 65536)` probes.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::{EndpointError, EndpointResult};

/// Upper bound on offsets examined by one `allocate` call.
const MAX_PROBES: u64 = 65_536;

/// An IPv4 block in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Create a block, masking `address` down to its network address.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> EndpointResult<Self> {
        if prefix_len > 32 {
            return Err(EndpointError::InvalidCidr(format!(
                "prefix length {prefix_len} exceeds 32"
            )));
        }
        Ok(Self {
            network: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.96.0.0/16").
    pub fn from_cidr(s: &str) -> EndpointResult<Self> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(EndpointError::InvalidCidr(format!("missing '/' in CIDR: {s}")));
        };

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| EndpointError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| EndpointError::InvalidCidr(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.network
    }

    /// Offset range `[first, last]` the allocator may issue.
    fn usable_range(&self) -> (u64, u64) {
        let size = self.size();
        if self.prefix_len >= 31 {
            (0, size - 1)
        } else {
            (1, size - 2)
        }
    }

    fn offset_of(&self, addr: Ipv4Addr) -> u64 {
        u64::from(u32::from(addr) - u32::from(self.network))
    }

    fn addr_at(&self, offset: u64) -> Ipv4Addr {
        // Offsets are always below `size()`, so this stays inside the block.
        Ipv4Addr::from(u32::from(self.network).wrapping_add(offset as u32))
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    Ipv4Addr::from(bits & mask)
}

#[derive(Debug)]
struct Pool {
    allocated: HashSet<u64>,
    /// Offset the next scan starts from.
    next: u64,
}

/// Thread-safe ClusterIP pool.
#[derive(Debug)]
pub struct ClusterIpAllocator {
    cidr: Ipv4Cidr,
    pool: Mutex<Pool>,
}

impl ClusterIpAllocator {
    pub fn new(cidr: Ipv4Cidr) -> Self {
        let (first, _) = cidr.usable_range();
        Self {
            cidr,
            pool: Mutex::new(Pool {
                allocated: HashSet::new(),
                next: first,
            }),
        }
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    fn lock(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next free address.
    pub fn allocate(&self) -> EndpointResult<Ipv4Addr> {
        let (first, last) = self.cidr.usable_range();
        let usable = last - first + 1;
        let mut pool = self.lock();

        for probe in 0..usable.min(MAX_PROBES) {
            let offset = first + (pool.next - first + probe) % usable;
            if pool.allocated.insert(offset) {
                pool.next = if offset == last { first } else { offset + 1 };
                let ip = self.cidr.addr_at(offset);
                debug!(%ip, cidr = %self.cidr, "cluster IP allocated");
                return Ok(ip);
            }
        }
        Err(EndpointError::PoolExhausted(self.cidr.to_string()))
    }

    /// Return an address to the pool.
    ///
    /// Fails with [`EndpointError::NotAllocated`] for addresses that were
    /// never allocated or were already released.
    pub fn release(&self, ip: Ipv4Addr) -> EndpointResult<()> {
        if !self.cidr.contains(ip) {
            return Err(EndpointError::NotAllocated(ip.to_string()));
        }
        let offset = self.cidr.offset_of(ip);
        if !self.lock().allocated.remove(&offset) {
            return Err(EndpointError::NotAllocated(ip.to_string()));
        }
        debug!(%ip, "cluster IP released");
        Ok(())
    }

    /// Mark a known address as allocated.
    ///
    /// Returns `false` if it was already allocated.
    pub fn reserve(&self, ip: Ipv4Addr) -> EndpointResult<bool> {
        if !self.cidr.contains(ip) {
            return Err(EndpointError::InvalidAddress(format!(
                "{ip} is not in {}",
                self.cidr
            )));
        }
        let offset = self.cidr.offset_of(ip);
        let (first, last) = self.cidr.usable_range();
        if offset < first || offset > last {
            return Err(EndpointError::InvalidAddress(format!(
                "{ip} is reserved in {}",
                self.cidr
            )));
        }
        Ok(self.lock().allocated.insert(offset))
    }

    pub fn is_allocated(&self, ip: Ipv4Addr) -> bool {
        self.cidr.contains(ip) && self.lock().allocated.contains(&self.cidr.offset_of(ip))
    }

    pub fn allocated_count(&self) -> usize {
        self.lock().allocated.len()
    }
}
