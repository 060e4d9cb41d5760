// flags.rs - Flag reference resolution
//
// Turns numeric flag addresses into Python references through the bank and
// flag tables, honoring each flag's inclusion policy.

use crate::settings::{Policy, Settings};

/// Result of resolving one flag address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagRef {
    /// Accessible reference, e.g. `will_flagbank['skipping']`
    Ref(String),
    /// Dropped without comment
    Excluded,
    /// Dropped; carries the reference for the explanatory comment
    Hinted(String),
    /// Address outside every bank
    Unmapped,
}

/// Resolve a direct flag access
pub fn resolve(settings: &Settings, addr: u32) -> FlagRef {
    let Some(bank) = settings.bank_for(addr) else {
        return FlagRef::Unmapped;
    };
    let Some(entry) = settings.flag(addr) else {
        return FlagRef::Ref(format!("{}[{}]", bank.name, addr));
    };
    let reference = match &entry.name {
        Some(name) => format!("{}['{}']", bank.name, name),
        None => format!("{}[{}]", bank.name, addr),
    };
    match entry.policy {
        Policy::Include => FlagRef::Ref(reference),
        Policy::Exclude => FlagRef::Excluded,
        Policy::Hint => FlagRef::Hinted(reference),
    }
}

/// Expression viewing every bank as one mapping, first bank outermost
pub fn combined_banks(settings: &Settings) -> String {
    let mut banks = settings.flag_banks.iter();
    let mut view = banks.next().map(|b| b.name.clone()).unwrap_or_default();
    for bank in banks {
        view.push_str(&format!(".map_({})", bank.name));
    }
    view
}

/// One level of indirection: the flag at `addr` holds the address to read
pub fn resolve_indirect(settings: &Settings, addr: u32) -> FlagRef {
    match resolve(settings, addr) {
        FlagRef::Ref(inner) => FlagRef::Ref(format!("{}[{}]", combined_banks(settings), inner)),
        other => other,
    }
}
