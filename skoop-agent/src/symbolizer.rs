//! Kernel stack symbolization for reset events

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use skoop_common::{tcp_state_name, TcpResetEvent};

/// Source of raw stack frames keyed by stack id
pub trait StackSource: Send + Sync {
    /// Instruction pointers for a captured stack, innermost first
    fn frames(&self, stack_id: u32) -> Option<Vec<u64>>;
}

/// Address -> symbol table, usually read from `/proc/kallsyms`
#[derive(Debug, Clone, Default)]
pub struct KernelSymbols {
    symbols: BTreeMap<u64, String>,
}

impl KernelSymbols {
    pub fn new(symbols: BTreeMap<u64, String>) -> Self {
        Self { symbols }
    }

    #[cfg(target_os = "linux")]
    pub fn load() -> anyhow::Result<Self> {
        use anyhow::Context;

        let symbols = aya::util::kernel_symbols().context("Failed to read kernel symbols")?;
        Ok(Self { symbols })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Render `ip` as `symbol+0xoffset`, or the bare address when no symbol
    /// starts at or below it.
    pub fn resolve(&self, ip: u64) -> String {
        match self.symbols.range(..=ip).next_back() {
            Some((start, name)) if ip == *start => name.clone(),
            Some((start, name)) => format!("{}+0x{:x}", name, ip - start),
            None => format!("0x{:x}", ip),
        }
    }
}

/// Decoded reset event plus its symbolized kernel stack
#[derive(Debug, Clone)]
pub struct ResetRecord {
    pub event: TcpResetEvent,
    pub stack: Vec<String>,
}

impl fmt::Display for ResetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = &self.event;
        let meta = event.skb_meta;
        let endpoint = |addr: Option<std::net::SocketAddr>| {
            addr.map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        write!(
            f,
            "{} {} -> {} state={} ifindex={} mark={:#x}",
            event.reset_kind(),
            endpoint(event.source()),
            endpoint(event.destination()),
            tcp_state_name(event.state),
            { meta.ifindex },
            { meta.mark },
        )?;
        if !self.stack.is_empty() {
            write!(f, " stack=[{}]", self.stack.join(" <- "))?;
        }
        Ok(())
    }
}

/// Turns raw events into [`ResetRecord`]s
#[derive(Clone, Default)]
pub struct Symbolizer {
    stacks: Option<Arc<dyn StackSource>>,
    symbols: Option<KernelSymbols>,
}

impl Symbolizer {
    pub fn new(stacks: Option<Arc<dyn StackSource>>, symbols: Option<KernelSymbols>) -> Self {
        Self { stacks, symbols }
    }

    pub fn record(&self, event: TcpResetEvent) -> ResetRecord {
        let frames = match (&self.stacks, event.stack_key()) {
            (Some(stacks), Some(id)) => stacks.frames(id).unwrap_or_default(),
            _ => Vec::new(),
        };

        let stack = frames
            .into_iter()
            .map(|ip| match &self.symbols {
                Some(symbols) => symbols.resolve(ip),
                None => format!("0x{:x}", ip),
            })
            .collect();

        ResetRecord { event, stack }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skoop_common::{kind, l3, protocol, SkbMeta, Tuple};
    use std::collections::HashMap;

    struct FixedStacks(HashMap<u32, Vec<u64>>);

    impl StackSource for FixedStacks {
        fn frames(&self, stack_id: u32) -> Option<Vec<u64>> {
            self.0.get(&stack_id).cloned()
        }
    }

    fn symbols() -> KernelSymbols {
        let mut map = BTreeMap::new();
        map.insert(0xffff_0000, "tcp_send_active_reset".to_string());
        map.insert(0xffff_0400, "tcp_disconnect".to_string());
        map.insert(0xffff_1000, "inet_release".to_string());
        KernelSymbols::new(map)
    }

    fn event(stack_id: i64) -> TcpResetEvent {
        let mut saddr = [0u8; 16];
        saddr[..4].copy_from_slice(&[10, 0, 0, 1]);
        let mut daddr = [0u8; 16];
        daddr[..4].copy_from_slice(&[10, 0, 0, 2]);

        TcpResetEvent {
            kind: kind::ACTIVE,
            state: 1,
            tuple: Tuple {
                saddr,
                daddr,
                sport: 5000,
                dport: 80,
                l3_proto: l3::IPV4,
                l4_proto: protocol::TCP,
                _pad: 0,
            },
            skb_meta: SkbMeta {
                netns: 0,
                mark: 0,
                ifindex: 2,
                len: 0,
                mtu: 0,
                sk_state: 1,
                protocol: l3::IPV4,
                _pad: 0,
            },
            _reserved: [0; 7],
            stack_id,
        }
    }

    #[test]
    fn test_resolve_symbol_offsets() {
        let symbols = symbols();
        assert_eq!(symbols.resolve(0xffff_0000), "tcp_send_active_reset");
        assert_eq!(symbols.resolve(0xffff_0410), "tcp_disconnect+0x10");
        assert_eq!(symbols.resolve(0x10), "0x10");
    }

    #[test]
    fn test_record_symbolizes_stack() {
        let mut stacks = HashMap::new();
        stacks.insert(7, vec![0xffff_0008, 0xffff_1020]);
        let symbolizer = Symbolizer::new(Some(Arc::new(FixedStacks(stacks))), Some(symbols()));

        let record = symbolizer.record(event(7));
        assert_eq!(
            record.stack,
            vec!["tcp_send_active_reset+0x8", "inet_release+0x20"]
        );

        let line = record.to_string();
        assert!(line.starts_with("TCPResetActive 10.0.0.1:5000 -> 10.0.0.2:80"));
        assert!(line.contains("state=ESTABLISHED"));
    }

    #[test]
    fn test_record_without_stack() {
        let symbolizer = Symbolizer::new(None, Some(symbols()));
        assert!(symbolizer.record(event(7)).stack.is_empty());

        let mut stacks = HashMap::new();
        stacks.insert(7, vec![0x1]);
        let symbolizer = Symbolizer::new(Some(Arc::new(FixedStacks(stacks))), None);
        assert!(symbolizer.record(event(-1)).stack.is_empty());
        assert_eq!(symbolizer.record(event(7)).stack, vec!["0x1"]);
    }
}
