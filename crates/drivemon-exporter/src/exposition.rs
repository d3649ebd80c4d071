//! Prometheus text exposition rendering
//!
//! Renders a collect cycle into the text format, one family block per
//! descriptor name: `# HELP` (when present), `# TYPE`, then the sample
//! lines. Families appear in first-observation order.

use crate::desc::Observation;
use std::collections::HashMap;
use std::fmt::Write;

/// Content type served alongside the rendered body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render observations into the text exposition format.
#[must_use]
pub fn render(observations: &[Observation]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&Observation>> = HashMap::new();
    for obs in observations {
        let name = obs.desc.name.as_str();
        groups
            .entry(name)
            .or_insert_with(|| {
                order.push(name);
                Vec::new()
            })
            .push(obs);
    }

    let mut out = String::with_capacity(observations.len() * 64);
    for name in order {
        let Some(group) = groups.get(name) else {
            continue;
        };
        let first = group[0];
        if !first.desc.help.is_empty() {
            let _ = writeln!(out, "# HELP {} {}", name, escape_help(&first.desc.help));
        }
        let _ = writeln!(out, "# TYPE {} {}", name, first.kind.as_str());
        for obs in group {
            let _ = write!(out, "{name}");
            if !obs.label_values.is_empty() {
                let _ = write!(out, "{{");
                for (i, (label, value)) in
                    obs.desc.labels.iter().zip(&obs.label_values).enumerate()
                {
                    if i > 0 {
                        let _ = write!(out, ",");
                    }
                    let _ = write!(out, "{}=\"{}\"", label, escape_label_value(value));
                }
                let _ = write!(out, "}}");
            }
            let _ = writeln!(out, " {}", obs.value);
        }
    }
    out
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{MetricDesc, MetricKind};
    use std::sync::Arc;

    fn obs(desc: &Arc<MetricDesc>, kind: MetricKind, value: f64, labels: &[&str]) -> Observation {
        Observation {
            desc: Arc::clone(desc),
            kind,
            value,
            label_values: labels.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    #[test]
    fn test_render_family_block() {
        let desc = Arc::new(MetricDesc::new("smart_sata_Power_On_Hours", "09", &["dev"]));
        let out = render(&[
            obs(&desc, MetricKind::Gauge, 423.0, &["sda"]),
            obs(&desc, MetricKind::Gauge, 17.0, &["sdb"]),
        ]);
        assert_eq!(
            out,
            "# HELP smart_sata_Power_On_Hours 09\n\
             # TYPE smart_sata_Power_On_Hours gauge\n\
             smart_sata_Power_On_Hours{dev=\"sda\"} 423\n\
             smart_sata_Power_On_Hours{dev=\"sdb\"} 17\n"
        );
    }

    #[test]
    fn test_render_skips_empty_help() {
        let desc = Arc::new(MetricDesc::new("smart_nvme_Temperature", "", &["dev"]));
        let out = render(&[obs(&desc, MetricKind::Gauge, 310.0, &["nvme0"])]);
        assert!(!out.contains("# HELP"));
        assert!(out.contains("# TYPE smart_nvme_Temperature gauge\n"));
    }

    #[test]
    fn test_render_counter_type() {
        let desc = Arc::new(MetricDesc::new("smart_nvme_PowerCycles", "", &["dev"]));
        let out = render(&[obs(&desc, MetricKind::Counter, 88.0, &["nvme0"])]);
        assert!(out.contains("# TYPE smart_nvme_PowerCycles counter\n"));
        assert!(out.contains("smart_nvme_PowerCycles{dev=\"nvme0\"} 88\n"));
    }

    #[test]
    fn test_render_escapes_label_values() {
        let desc = Arc::new(MetricDesc::new("smart_sata_Info", "", &["dev", "Device_Model"]));
        let out = render(&[obs(
            &desc,
            MetricKind::Gauge,
            0.0,
            &["sda", "Odd\"Model\\Name"],
        )]);
        assert!(out.contains("Device_Model=\"Odd\\\"Model\\\\Name\""));
    }

    #[test]
    fn test_render_groups_preserve_first_seen_order() {
        let a = Arc::new(MetricDesc::new("metric_a", "", &["dev"]));
        let b = Arc::new(MetricDesc::new("metric_b", "", &["dev"]));
        let out = render(&[
            obs(&a, MetricKind::Gauge, 1.0, &["x"]),
            obs(&b, MetricKind::Gauge, 2.0, &["x"]),
            obs(&a, MetricKind::Gauge, 3.0, &["y"]),
        ]);
        let a_pos = out.find("# TYPE metric_a").unwrap();
        let b_pos = out.find("# TYPE metric_b").unwrap();
        assert!(a_pos < b_pos);
        // Both metric_a samples sit in one family block.
        assert_eq!(out.matches("# TYPE metric_a").count(), 1);
    }

    #[test]
    fn test_render_no_labels() {
        let desc = Arc::new(MetricDesc::new("metric_plain", "", &[]));
        let out = render(&[obs(&desc, MetricKind::Gauge, 5.0, &[])]);
        assert!(out.contains("metric_plain 5\n"));
    }
}
