use svnctx::output::{format_human, HumanOutput};

#[test]
fn format_human_includes_sections() {
    let mut human = HumanOutput::new("svnctx lock: 3 directories locked and released");
    human.push_summary("root", "/tmp/wc");
    human.push_detail("/tmp/wc/a");
    human.push_warning("stale lock file present");
    human.push_next_step("svnctx cleanup /tmp/wc");

    let rendered = format_human(&human);
    assert!(rendered.contains("svnctx lock: 3 directories locked and released"));
    assert!(rendered.contains("Summary:"));
    assert!(rendered.contains("- root: /tmp/wc"));
    assert!(rendered.contains("Details:"));
    assert!(rendered.contains("- /tmp/wc/a"));
    assert!(rendered.contains("Warnings:"));
    assert!(rendered.contains("- stale lock file present"));
    assert!(rendered.contains("Next steps:"));
    assert!(rendered.contains("- svnctx cleanup /tmp/wc"));
}

#[test]
fn format_human_omits_empty_sections() {
    let human = HumanOutput::new("svnctx cleanup: nothing to do");
    let rendered = format_human(&human);
    assert_eq!(rendered, "svnctx cleanup: nothing to do");
}
