//! Stack frame reconstruction by walking the frame-pointer chain.
//!
//! Each frame record holds the caller's fp at `[fp]` and the return
//! address at `[fp + 8]`. The chain ends at a zero link, a zero
//! return address, or a link that fails to move outward (stacks grow
//! down, so every caller's record sits at a higher address).

use crate::target::{Arch, Inferior, TargetError};

/// One reconstructed frame. `base` is the frame-pointer value of the
/// frame and doubles as its identity: bases strictly increase going
/// outward, so "is A inner than B" is a plain compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// 0 = innermost
    pub level: u32,
    pub base: u64,
    pub pc: u64,
}

impl Frame {
    /// True when `self` is closer to the point of execution than
    /// `other`.
    pub fn inner_than(&self, other: &Frame) -> bool {
        self.base < other.base
    }
}

fn read_u64<T: Inferior>(target: &mut T, addr: u64) -> Result<u64, TargetError> {
    let bytes = target.read_memory(addr, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(buf))
}

/// Reconstruct the call chain, innermost first, up to `limit` frames.
///
/// Corrupt chains terminate the walk rather than erroring: the
/// frames recovered so far are still usable.
pub fn unwind<T: Inferior>(
    target: &mut T,
    arch: &Arch,
    limit: usize,
) -> Result<Vec<Frame>, TargetError> {
    let mut frames = Vec::new();
    let mut base = target.read_register(arch.fp_reg)?;
    let pc = target.read_register(arch.pc_reg)?;
    frames.push(Frame { level: 0, base, pc });

    while frames.len() < limit {
        let prev = match read_u64(target, base) {
            Ok(v) => v,
            Err(_) => break,
        };
        let ret = match read_u64(target, base + 8) {
            Ok(v) => v,
            Err(_) => break,
        };
        if prev == 0 || ret == 0 || prev <= base {
            break;
        }
        frames.push(Frame { level: frames.len() as u32, base: prev, pc: ret });
        base = prev;
    }
    Ok(frames)
}

/// The frame with this base, if the chain reaches it. A base can
/// recur in a corrupt chain; the most-outward match wins.
pub fn find<'a>(frames: &'a [Frame], base: u64) -> Option<&'a Frame> {
    frames.iter().rev().find(|f| f.base == base)
}

/// A register as seen by the frame with base `base`. The pc and fp
/// come from the reconstructed chain, the link register from the
/// frame record; everything else reads the live register, which is
/// only exact for the innermost frame.
pub fn register_in_frame<T: Inferior>(
    target: &mut T,
    arch: &Arch,
    frames: &[Frame],
    base: u64,
    reg: usize,
) -> Result<u64, TargetError> {
    let idx = find(frames, base).map(|f| f.level as usize);
    match idx {
        None | Some(0) => target.read_register(reg),
        Some(i) => {
            if reg == arch.pc_reg {
                Ok(frames[i].pc)
            } else if reg == arch.fp_reg {
                Ok(frames[i].base)
            } else if reg == arch.lr_reg {
                read_u64(target, frames[i].base + 8)
            } else if reg == arch.sp_reg {
                // The caller's sp is at least past the callee's record.
                Ok(frames[i - 1].base + 16)
            } else {
                target.read_register(reg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{WaitStatus, AARCH64};

    struct StackImage {
        mem: Vec<u8>,
        regs: [u64; 34],
    }

    impl StackImage {
        fn new() -> Self {
            Self { mem: vec![0; 0x10000], regs: [0; 34] }
        }

        fn put_u64(&mut self, addr: u64, v: u64) {
            let a = addr as usize;
            self.mem[a..a + 8].copy_from_slice(&v.to_le_bytes());
        }
    }

    impl Inferior for StackImage {
        fn read_memory(&mut self, addr: u64, len: usize) -> Result<Vec<u8>, TargetError> {
            let a = addr as usize;
            if a + len > self.mem.len() {
                return Err(TargetError::Memory { addr });
            }
            Ok(self.mem[a..a + len].to_vec())
        }

        fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), TargetError> {
            let a = addr as usize;
            self.mem[a..a + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn read_register(&mut self, reg: usize) -> Result<u64, TargetError> {
            Ok(self.regs[reg])
        }

        fn write_register(&mut self, reg: usize, v: u64) -> Result<(), TargetError> {
            self.regs[reg] = v;
            Ok(())
        }

        fn resume(&mut self, _: bool, _: Option<i32>) -> Result<(), TargetError> {
            Ok(())
        }

        fn wait(&mut self) -> Result<WaitStatus, TargetError> {
            Ok(WaitStatus::Stopped(0))
        }

        fn kill(&mut self) -> Result<(), TargetError> {
            Ok(())
        }
    }

    /// main (fp 0x9000) -> f (fp 0x8000) -> g (fp 0x7000), stopped in g.
    fn three_frames() -> StackImage {
        let mut s = StackImage::new();
        s.regs[AARCH64.pc_reg] = 0x400;
        s.regs[AARCH64.fp_reg] = 0x7000;
        s.put_u64(0x7000, 0x8000); // g's record: caller fp
        s.put_u64(0x7008, 0x304); // return into f
        s.put_u64(0x8000, 0x9000);
        s.put_u64(0x8008, 0x204); // return into main
        s.put_u64(0x9000, 0); // end of chain
        s
    }

    #[test]
    fn test_unwind_three_frames() {
        let mut s = three_frames();
        let frames = unwind(&mut s, &AARCH64, 32).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame { level: 0, base: 0x7000, pc: 0x400 });
        assert_eq!(frames[1], Frame { level: 1, base: 0x8000, pc: 0x304 });
        assert_eq!(frames[2], Frame { level: 2, base: 0x9000, pc: 0x204 });
        assert!(frames[0].inner_than(&frames[1]));
    }

    #[test]
    fn test_unwind_stops_on_non_monotonic_link() {
        let mut s = three_frames();
        // f's record points back inward: corrupt.
        s.put_u64(0x8000, 0x6000);
        let frames = unwind(&mut s, &AARCH64, 32).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_unwind_respects_limit() {
        let mut s = three_frames();
        let frames = unwind(&mut s, &AARCH64, 2).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_find_prefers_most_outward_frame() {
        let frames = [
            Frame { level: 0, base: 0x7000, pc: 0x400 },
            Frame { level: 1, base: 0x8000, pc: 0x304 },
            Frame { level: 2, base: 0x8000, pc: 0x204 },
        ];
        let f = find(&frames, 0x8000).unwrap();
        assert_eq!(f.level, 2);
        assert!(find(&frames, 0x6000).is_none());
    }

    #[test]
    fn test_register_in_outer_frame() {
        let mut s = three_frames();
        s.regs[3] = 0xdede;
        let frames = unwind(&mut s, &AARCH64, 32).unwrap();
        let pc = register_in_frame(&mut s, &AARCH64, &frames, 0x8000, AARCH64.pc_reg).unwrap();
        assert_eq!(pc, 0x304);
        let fp = register_in_frame(&mut s, &AARCH64, &frames, 0x8000, AARCH64.fp_reg).unwrap();
        assert_eq!(fp, 0x8000);
        // Unsaved registers read live.
        let x3 = register_in_frame(&mut s, &AARCH64, &frames, 0x8000, 3).unwrap();
        assert_eq!(x3, 0xdede);
        // Innermost frame reads live.
        let pc0 = register_in_frame(&mut s, &AARCH64, &frames, 0x7000, AARCH64.pc_reg).unwrap();
        assert_eq!(pc0, 0x400);
    }
}
