//! Ordered whole-file rewrite rules.
//!
//! Each bootloader gets three rules, applied in order:
//!
//! | rule          | grub line | isolinux line | required |
//! |---------------|-----------|---------------|----------|
//! | `rootfs-url`  | `linux`   | `append`      | yes, >= 1 match |
//! | `drop-liveiso`| any       | any           | no, >= 0 matches |
//! | `initrd`      | `initrd`  | `append ... initrd=` | yes, >= 1 match |
//!
//! Every rule replaces all of its matches, so a config with several menu
//! entries gets every entry rewritten.

use anyhow::Result;
use regex::Regex;

use super::{BootLoader, LIVE_ISO_PARAM, ROOTFS_URL_PARAM};
use crate::error::EditError;

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    replacement: String,
    pub required: bool,
}

impl Rule {
    pub fn new(
        name: &'static str,
        pattern: &str,
        replacement: String,
        required: bool,
    ) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            EditError::FormatError(format!("bad pattern for rule '{}': {}", name, e))
        })?;
        Ok(Self {
            name,
            pattern,
            replacement,
            required,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Rewrite every match in `text`. Returns the new text and the match count.
    pub fn apply(&self, text: &str) -> (String, usize) {
        let count = self.pattern.find_iter(text).count();
        if count == 0 {
            return (text.to_string(), 0);
        }
        let rewritten = self
            .pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned();
        (rewritten, count)
    }
}

/// Escape `$` so a value is inserted literally into a replacement template.
fn literal(value: &str) -> String {
    value.replace('$', "$$")
}

fn drop_live_iso() -> Result<Rule> {
    Rule::new(
        "drop-liveiso",
        &format!(r" {}=\S+", regex::escape(LIVE_ISO_PARAM)),
        String::new(),
        false,
    )
}

/// Build the ordered rule list for `loader`.
///
/// `initrds` are absolute ISO paths appended to the initrd reference, in order.
pub fn rules_for(loader: BootLoader, rootfs_url: &str, initrds: &[String]) -> Result<Vec<Rule>> {
    let url = literal(rootfs_url);
    let rules = match loader {
        BootLoader::Grub => vec![
            Rule::new(
                "rootfs-url",
                r"(?m)^([ \t]+linux) ([^\r\n]+)",
                format!("${{1}} ${{2}} '{}={}'", ROOTFS_URL_PARAM, url),
                true,
            )?,
            drop_live_iso()?,
            Rule::new(
                "initrd",
                r"(?m)^([ \t]+initrd) ([^\r\n]+)",
                format!("${{1}} ${{2}} {}", literal(&initrds.join(" "))),
                true,
            )?,
        ],
        BootLoader::Isolinux => vec![
            Rule::new(
                "rootfs-url",
                r"(?m)^([ \t]+append) ([^\r\n]+)",
                format!("${{1}} ${{2}} {}={}", ROOTFS_URL_PARAM, url),
                true,
            )?,
            drop_live_iso()?,
            Rule::new(
                "initrd",
                r"(?m)^([ \t]+append[^\r\n]*initrd=\S+) ([^\r\n]*)",
                format!("${{1}},{} ${{2}}", literal(&initrds.join(","))),
                true,
            )?,
        ],
    };
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initrds(with_ram_disk: bool) -> Vec<String> {
        let mut v = vec!["/images/assisted_installer_custom.img".to_string()];
        if with_ram_disk {
            v.push("/images/nmstate.img".to_string());
        }
        v
    }

    fn run_all(rules: &[Rule], text: &str) -> (String, Vec<usize>) {
        let mut text = text.to_string();
        let mut counts = Vec::new();
        for rule in rules {
            let (next, n) = rule.apply(&text);
            text = next;
            counts.push(n);
        }
        (text, counts)
    }

    const GRUB: &str = "\
menuentry 'RHEL CoreOS (Live)' --class fedora --class gnu-linux --class gnu --class os {
\tlinux /images/pxeboot/vmlinuz random.trust_cpu=on coreos.liveiso=rhcos-414 ignition.firstboot ignition.platform.id=metal
\tinitrd /images/pxeboot/initrd.img /images/ignition.img
}
";

    #[test]
    fn test_grub_without_ram_disk() {
        let rules = rules_for(BootLoader::Grub, "https://example.com/rootfs.img", &initrds(false)).unwrap();
        let (out, counts) = run_all(&rules, GRUB);

        assert_eq!(counts, vec![1, 1, 1]);
        assert!(out.contains(
            "\tlinux /images/pxeboot/vmlinuz random.trust_cpu=on ignition.firstboot ignition.platform.id=metal 'coreos.live.rootfs_url=https://example.com/rootfs.img'\n"
        ));
        assert!(out.contains(
            "\tinitrd /images/pxeboot/initrd.img /images/ignition.img /images/assisted_installer_custom.img\n"
        ));
        assert!(!out.contains("coreos.liveiso"));
        assert!(!out.contains("nmstate"));
    }

    #[test]
    fn test_grub_with_ram_disk_keeps_order() {
        let rules = rules_for(BootLoader::Grub, "http://h/r", &initrds(true)).unwrap();
        let (out, _) = run_all(&rules, GRUB);
        assert!(out.contains(
            "/images/ignition.img /images/assisted_installer_custom.img /images/nmstate.img\n"
        ));
    }

    const ISOLINUX: &str = "\
label linux
  menu label ^RHEL CoreOS (Live)
  menu default
  kernel /images/pxeboot/vmlinuz
  append initrd=/images/pxeboot/initrd.img,/images/ignition.img random.trust_cpu=on coreos.liveiso=rhcos-414 ignition.firstboot ignition.platform.id=metal
";

    #[test]
    fn test_isolinux_without_ram_disk() {
        let rules = rules_for(BootLoader::Isolinux, "https://example.com/rootfs.img", &initrds(false)).unwrap();
        let (out, counts) = run_all(&rules, ISOLINUX);

        assert_eq!(counts, vec![1, 1, 1]);
        assert!(out.contains(
            "  append initrd=/images/pxeboot/initrd.img,/images/ignition.img,/images/assisted_installer_custom.img random.trust_cpu=on ignition.firstboot ignition.platform.id=metal coreos.live.rootfs_url=https://example.com/rootfs.img\n"
        ));
    }

    #[test]
    fn test_isolinux_with_ram_disk() {
        let rules = rules_for(BootLoader::Isolinux, "http://h/r", &initrds(true)).unwrap();
        let (out, _) = run_all(&rules, ISOLINUX);
        assert!(out.contains(
            "initrd=/images/pxeboot/initrd.img,/images/ignition.img,/images/assisted_installer_custom.img,/images/nmstate.img random.trust_cpu=on"
        ));
    }

    #[test]
    fn test_dollar_in_url_is_literal() {
        let rules = rules_for(BootLoader::Grub, "http://h/r?sig=$1x", &initrds(false)).unwrap();
        let (out, _) = run_all(&rules, GRUB);
        assert!(out.contains("'coreos.live.rootfs_url=http://h/r?sig=$1x'"));
    }

    #[test]
    fn test_live_iso_marker_removed_in_any_position() {
        let rule = drop_live_iso().unwrap();
        let (out, n) = rule.apply("  linux /vmlinuz coreos.liveiso=a b coreos.liveiso=X-Y.z\n");
        assert_eq!(n, 2);
        assert_eq!(out, "  linux /vmlinuz b\n");
    }

    #[test]
    fn test_missing_marker_is_zero_matches() {
        let rule = drop_live_iso().unwrap();
        let (out, n) = rule.apply("  linux /vmlinuz quiet\n");
        assert_eq!(n, 0);
        assert_eq!(out, "  linux /vmlinuz quiet\n");
    }

    #[test]
    fn test_unindented_lines_are_ignored() {
        let rules = rules_for(BootLoader::Grub, "http://h/r", &initrds(false)).unwrap();
        let (_, n) = rules[0].apply("linux /vmlinuz\n");
        assert_eq!(n, 0);
    }

    #[test]
    fn test_crlf_lines_keep_terminator() {
        let rules = rules_for(BootLoader::Grub, "http://h/r", &initrds(false)).unwrap();
        let (out, _) = rules[0].apply("\tlinux /vmlinuz quiet\r\n");
        assert_eq!(out, "\tlinux /vmlinuz quiet 'coreos.live.rootfs_url=http://h/r'\r\n");
    }
}
