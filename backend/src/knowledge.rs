use itertools::Itertools;

use crate::entities::Profile;

const MENTOR: &str = "
Act as an expert career mentor for technology professionals.
You read a candidate's profile and produce one personalised, structured career recommendation.
You are encouraging but realistic, and every suggestion must be actionable.
";

const TASK: &str = "
## Task:
Write a career recommendation with the following sections:
1. **Best-fit roles**: two or three roles that match the profile, with one line each on why.
2. **Skill gaps**: the most valuable skills to learn next, ordered by impact.
3. **Learning roadmap**: a 3-month plan broken into monthly milestones.
4. **Project ideas**: two portfolio projects that would close the gaps above.
5. **Next step**: a single thing to do this week.

## Constraints:
- Base every point on the profile; do not invent experience the candidate did not mention.
- Do NOT provide legal or financial advice.
- Keep the whole answer under 400 words and use Markdown bullet points.
";

const NOT_PROVIDED: &str = "(not provided)";

/// Trims every line and drops blank ones so stray whitespace in a form
/// field does not change the prompt.
fn normalize(field: &str) -> String {
    let text = field
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .join("\n  ");
    if text.is_empty() {
        NOT_PROVIDED.to_string()
    } else {
        text
    }
}

/// Builds the mentor prompt. Pure function of the three fields.
pub fn build_prompt(skills: &str, interests: &str, projects: &str) -> String {
    format!(
        "{}\n## Candidate profile:\n- **Skills**: {}\n- **Interests**: {}\n- **Projects**: {}\n{}",
        MENTOR.trim(),
        normalize(skills),
        normalize(interests),
        normalize(projects),
        TASK
    )
}

pub fn profile_prompt(profile: &Profile) -> String {
    build_prompt(&profile.skills, &profile.interests, &profile.projects)
}
