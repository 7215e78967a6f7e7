use regex::{Regex, RegexBuilder};

/// How a matched attack pattern assigns its capture groups to IP roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRule {
    /// Sole capture group is the attacker; threat type comes from the
    /// pattern's friendly name.
    SingleAttacker,
    /// First group is the attacker, second the target.
    AttackerAndTarget,
    /// First group names the attack verbatim, second is the attacker.
    LabelAndAttacker,
}

#[derive(Debug, Clone)]
pub struct AttackPattern {
    pub name: &'static str,
    pub friendly_name: &'static str,
    pub detector: Regex,
    pub role: RoleRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreatSignature {
    pub name: &'static str,
    pub detector: Regex,
    pub severity: Severity,
    pub description: &'static str,
}

/// Immutable registry of attack patterns and threat signatures.
/// Order defines match priority; first match wins in both lists.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub attack_patterns: Vec<AttackPattern>,
    pub threat_signatures: Vec<ThreatSignature>,
}

fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("catalog regex must compile")
}

impl Default for Catalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}

impl Catalog {
    pub fn default_catalog() -> Self {
        let attack_patterns = vec![
            AttackPattern {
                name: "ssh_failed_login",
                friendly_name: "SSH failed login",
                detector: ci(r"Failed password for .+ from (\d+\.\d+\.\d+\.\d+)"),
                role: RoleRule::SingleAttacker,
            },
            AttackPattern {
                name: "ssh_repeated_login",
                friendly_name: "repeated SSH login failures",
                detector: ci(r"repeated login failures from (\d+\.\d+\.\d+\.\d+)"),
                role: RoleRule::SingleAttacker,
            },
            AttackPattern {
                name: "firewall_block",
                friendly_name: "firewall block",
                detector: ci(
                    r"blocked (?:from|source) (\d+\.\d+\.\d+\.\d+).*(?:to|dest) (\d+\.\d+\.\d+\.\d+)",
                ),
                role: RoleRule::AttackerAndTarget,
            },
            AttackPattern {
                name: "port_scan",
                friendly_name: "port scan",
                detector: ci(r"scan from (\d+\.\d+\.\d+\.\d+)"),
                role: RoleRule::SingleAttacker,
            },
            AttackPattern {
                name: "web_attack",
                friendly_name: "web application attack",
                detector: ci(
                    r"(SQL injection|XSS|CSRF|directory traversal|file inclusion).*from (\d+\.\d+\.\d+\.\d+)",
                ),
                role: RoleRule::LabelAndAttacker,
            },
            AttackPattern {
                name: "malware",
                friendly_name: "malware activity",
                detector: ci(r"(?:trojan|virus|malware|ransomware|backdoor) .*?(\d+\.\d+\.\d+\.\d+)"),
                role: RoleRule::SingleAttacker,
            },
            AttackPattern {
                name: "dos_attack",
                friendly_name: "denial of service",
                detector: ci(r"(?:DoS|DDoS|flood).*from (\d+\.\d+\.\d+\.\d+)"),
                role: RoleRule::SingleAttacker,
            },
        ];

        let threat_signatures = vec![
            ThreatSignature {
                name: "sql_injection",
                detector: ci(r"(?:SQL injection|SQLMAP|union\s+select|select\s+from|'--|\b(?:or|and)\s+1=1)"),
                severity: Severity::High,
                description: "SQL injection attempt",
            },
            ThreatSignature {
                name: "xss",
                detector: ci(r"(?:<script>|javascript:|onerror=|onload=|eval\(|document\.cookie)"),
                severity: Severity::Medium,
                description: "cross-site scripting (XSS) attempt",
            },
            ThreatSignature {
                name: "command_injection",
                detector: ci(r"(?:;ls\s|;cat\s|;rm\s|;wget\s|\|\s*bash|\|\s*sh)"),
                severity: Severity::High,
                description: "command injection attempt",
            },
            ThreatSignature {
                name: "file_inclusion",
                detector: ci(r"(?:\.\./|\.\.%2f|/etc/passwd|/var/www)"),
                severity: Severity::High,
                description: "file inclusion or path traversal attempt",
            },
            ThreatSignature {
                name: "bruteforce",
                detector: ci(r"(?:brute force|dictionary attack|password guess|login failure)"),
                severity: Severity::Medium,
                description: "brute-force or password guessing attack",
            },
            ThreatSignature {
                name: "privilege_escalation",
                detector: ci(r"(?:sudo|su\s|setuid|setgid|chmod\s+[0-7]*s)"),
                severity: Severity::High,
                description: "privilege escalation attempt",
            },
        ];

        Catalog { attack_patterns, threat_signatures }
    }
}
