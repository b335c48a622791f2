use colored::*;
use kernel::{Fault, Supervisor};
use machine::Machine;
use serde::Serialize;
use types::BoxConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub image: String,
    pub cfgtbl: (u32, u32),
    pub outcome: Outcome,
    pub boxes: Vec<BoxReport>,
    pub irqs: Vec<IrqReport>,
    /// Protection slots as left by boot, with box 0 loaded.
    pub slots: Vec<SlotReport>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Outcome {
    Booted,
    Rejected { class: String, fault: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BoxReport {
    pub id: u8,
    pub config_addr: u32,
    /// Raw configuration record, hex encoded.
    pub record: String,
    pub stack: (u32, u32),
    pub sp: u32,
    pub context: Option<u32>,
    pub regions: Vec<RegionReport>,
    pub peripheral_slots: Vec<usize>,
    pub shared_slots: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReport {
    pub base: u32,
    pub size: u32,
    pub rasr: u32,
    pub acl: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrqReport {
    pub irq: u32,
    pub owner: u8,
    pub handler: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotReport {
    pub slot: usize,
    pub rbar: u32,
    pub rasr: u32,
}

impl Report {
    pub fn rejected(image: String, cfgtbl: (u32, u32), fault: &Fault) -> Self {
        Self {
            image,
            cfgtbl,
            outcome: Outcome::Rejected {
                class: format!("{:?}", fault.class()),
                fault: fault.to_string(),
            },
            boxes: Vec::new(),
            irqs: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn booted(image: String, hw: &Machine, sup: &Supervisor) -> Self {
        let registry = sup.registry();
        let boxes = registry
            .boxes()
            .iter()
            .map(|b| {
                let record = hw
                    .flash
                    .mem_slice(b.config_addr, b.config_addr + BoxConfig::SIZE)
                    .map(|bytes| hex::encode(&*bytes))
                    .unwrap_or_default();
                BoxReport {
                    id: b.id,
                    config_addr: b.config_addr,
                    record,
                    stack: (b.stack.start, b.stack.end),
                    sp: b.sp,
                    context: b.context,
                    regions: registry
                        .regions_of(b.id)
                        .iter()
                        .map(|r| RegionReport {
                            base: r.base,
                            size: r.size,
                            rasr: r.rasr,
                            acl: format!("{:?}", r.acl),
                            source: format!("{:?}", r.source),
                        })
                        .collect(),
                    peripheral_slots: b.periph.slots().collect(),
                    shared_slots: b.periph_shared.slots().collect(),
                }
            })
            .collect();

        let irqs = sup
            .irqs()
            .owned()
            .filter_map(|(irq, v)| {
                v.owner.map(|owner| IrqReport {
                    irq,
                    owner,
                    handler: v.handler,
                })
            })
            .collect();

        let slots = hw
            .mpu
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, regs)| regs.enabled())
            .map(|(slot, regs)| SlotReport {
                slot,
                rbar: regs.rbar,
                rasr: regs.rasr,
            })
            .collect();

        let cfgtbl = sup.info().cfgtbl_ptr;
        Self {
            image,
            cfgtbl: (cfgtbl.start, cfgtbl.end),
            outcome: Outcome::Booted,
            boxes,
            irqs,
            slots,
        }
    }

    pub fn print_text(&self) {
        println!("{}", "=== Box Layout Report ===".bold());
        println!("Image: {}", self.image);
        println!("Config table: 0x{:08x}..0x{:08x}", self.cfgtbl.0, self.cfgtbl.1);

        match &self.outcome {
            Outcome::Booted => println!("Result: {}", "booted".green().bold()),
            Outcome::Rejected { class, fault } => {
                println!("Result: {} ({})", "rejected".red().bold(), class);
                println!("  {}", fault.red());
                return;
            }
        }

        for b in &self.boxes {
            println!();
            println!("{}", format!("box[{}] @ 0x{:08x}", b.id, b.config_addr).cyan().bold());
            println!("  record:  {}", b.record.dimmed());
            println!("  stack:   0x{:08x}..0x{:08x} (sp 0x{:08x})", b.stack.0, b.stack.1, b.sp);
            if let Some(ctx) = b.context {
                println!("  context: 0x{:08x}", ctx);
            }
            for r in &b.regions {
                println!(
                    "  region   0x{:08x} {:>8} rasr 0x{:08x} {} [{}]",
                    r.base, r.size, r.rasr, r.acl, r.source
                );
            }
            if !b.peripheral_slots.is_empty() {
                println!("  devices: {:?}", b.peripheral_slots);
            }
            if !b.shared_slots.is_empty() {
                println!("  shared:  {:?}", b.shared_slots);
            }
        }

        if !self.irqs.is_empty() {
            println!();
            println!("{}", "Interrupts:".bold());
            for irq in &self.irqs {
                println!("  IRQ {:>3} -> box[{}] handler 0x{:08x}", irq.irq, irq.owner, irq.handler);
            }
        }

        println!();
        println!("{}", "Protection slots (box 0 loaded):".bold());
        for s in &self.slots {
            println!("  {:>2}: rbar 0x{:08x} rasr 0x{:08x}", s.slot, s.rbar, s.rasr);
        }
    }
}
