//! Prompt assembly for contribution plans
//!
//! The output-format section of the plan prompt is rendered from
//! [`STEP_HEADER_WORD`], the same constant the parser matches on.

use crate::repo::TreeNode;

use super::parser::STEP_HEADER_WORD;

const DIR_PREFIX: &str = "+-- ";
const FILE_PREFIX: &str = "|-- ";
const INDENT: &str = "    ";

/// Render a tree snapshot as an indented outline, preserving its order.
pub fn render_tree(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    render_level(nodes, 0, &mut out);
    out
}

fn render_level(nodes: &[TreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        for _ in 0..depth {
            out.push_str(INDENT);
        }
        out.push_str(if node.is_dir() { DIR_PREFIX } else { FILE_PREFIX });
        out.push_str(&node.name);
        out.push('\n');
        if let Some(children) = &node.children {
            render_level(children, depth + 1, out);
        }
    }
}

/// Mentoring prompt asking for a `Step N: Title` plan for one issue.
pub fn assemble_plan_prompt(issue_title: &str, issue_body: &str, rendered_tree: &str) -> String {
    let step = STEP_HEADER_WORD;
    format!(
        "You are a senior software engineer mentoring a new open-source contributor. \
         Your task is to provide a clear, concise, and actionable step-by-step plan to help them solve a specific GitHub issue. \
         The plan should be easy to follow for someone new to the codebase.\n\n\
         **GitHub Issue Title:**\n\
         \"{issue_title}\"\n\n\
         **GitHub Issue Description:**\n\
         \"{issue_body}\"\n\n\
         **Repository File Structure (partial):**\n\
         ```\n{rendered_tree}\n```\n\n\
         **Your Task:**\n\
         Based on all the information above, generate a step-by-step plan. For each step, provide a clear title and detailed instructions. \
         Identify the most relevant files the contributor should look at. If you suggest code changes, provide clear examples.\n\n\
         **Output Format:**\n\
         Use the following format exactly, with '{step} X: [Title]' on one line and the details on the following lines.\n\n\
         {step} 1: [Title for {step} 1]\n[Details for step 1...]\n\n\
         {step} 2: [Title for {step} 2]\n[Details for step 2...]\n\n\
         ..."
    )
}
