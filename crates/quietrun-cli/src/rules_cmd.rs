//! `quietrun rules`: print the effective rule table.

use std::io::Write;

use quietrun_core::{Rule, RuleTable};

/// Write one block per rule, in match order.
pub fn write_rules<W: Write>(out: &mut W, source: &str, table: &RuleTable) -> std::io::Result<()> {
    writeln!(out, "Rules from {source} ({} total, first match wins):", table.len())?;
    for (i, rule) in table.iter().enumerate() {
        writeln!(out)?;
        write_rule(out, i + 1, rule)?;
    }
    Ok(())
}

fn write_rule<W: Write>(out: &mut W, index: usize, rule: &Rule) -> std::io::Result<()> {
    let timing = if rule.needs_own_timing { "  (own timing)" } else { "" };
    writeln!(out, "{index:>3}. {} [{}]{timing}", rule.name, rule.kind)?;
    writeln!(out, "     hook:     {:?}", rule.hook)?;
    if let Some(pattern) = &rule.pattern {
        writeln!(out, "     pattern:  {}", pattern.as_str())?;
    }
    if rule.template.is_empty() {
        writeln!(out, "     template: (silent)")?;
    } else {
        writeln!(out, "     template: {:?}", rule.template)?;
    }
    for prefix in &rule.prefixes {
        writeln!(out, "     prefix:   {:?} => {:?}", prefix.needle, prefix.label)?;
    }
    Ok(())
}
