//! Course catalog queried by the student assistant's tools

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Course {
    pub name: String,
    pub code: String,
    pub teacher: String,
}

/// In-memory catalog of courses, schedules, and office hours.
#[derive(Debug, Default)]
pub struct Catalog {
    courses: Vec<Course>,
    schedules: HashMap<String, String>,
    office_hours: HashMap<String, String>,
}

impl Catalog {
    /// Look up a course schedule by course name, case-insensitively.
    /// Always returns user-facing prose; misses are messages, not errors.
    pub fn course_schedule(&self, course_name: &str) -> String {
        let Some(course) = self
            .courses
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(course_name))
        else {
            return format!("Course \"{course_name}\" not found.");
        };

        self.schedules
            .get(&course.code)
            .cloned()
            .unwrap_or_else(|| format!("No schedule found for {course_name}."))
    }

    /// Look up a teacher's office hours by exact name.
    pub fn teacher_availability(&self, teacher_name: &str) -> String {
        self.office_hours
            .get(teacher_name)
            .cloned()
            .unwrap_or_else(|| format!("No office hours found for {teacher_name}."))
    }

    pub fn sample() -> Self {
        let courses = vec![
            course("Calculus I", "MAT101", "Dr. Evelyn"),
            course("Introduction to Programming", "CS101", "Prof. Ricardo"),
            course("Classical Physics", "PHY101", "Dr. Monteiro"),
            course("Writing and Communication", "LNG101", "Prof. Lucia"),
        ];

        let schedules = [
            ("MAT101", "Mondays and Wednesdays, 10:00 - 12:00, Room 201"),
            ("CS101", "Tuesdays and Thursdays, 14:00 - 16:00, Lab B"),
            ("PHY101", "Mondays and Fridays, 08:00 - 10:00, Auditorium 3"),
            ("LNG101", "Wednesdays, 16:00 - 18:00, Room 105"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let office_hours = [
            ("Dr. Evelyn", "Wednesdays, 13:00 - 15:00, Office 12"),
            ("Prof. Ricardo", "Thursdays, 16:00 - 17:00 (online)"),
            ("Dr. Monteiro", "Fridays, 10:00 - 11:00, Office 15"),
            ("Prof. Lucia", "Tuesdays, 11:00 - 12:00, Faculty Lounge"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            courses,
            schedules,
            office_hours,
        }
    }
}

fn course(name: &str, code: &str, teacher: &str) -> Course {
    Course {
        name: name.to_string(),
        code: code.to_string(),
        teacher: teacher.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_lookup_is_case_insensitive() {
        let catalog = Catalog::sample();
        let schedule = catalog.course_schedule("calculus i");
        assert!(schedule.contains("Room 201"));
    }

    #[test]
    fn test_schedule_unknown_course() {
        let catalog = Catalog::sample();
        assert_eq!(
            catalog.course_schedule("Quantum Basketry"),
            "Course \"Quantum Basketry\" not found."
        );
    }

    #[test]
    fn test_schedule_known_course_without_schedule() {
        let mut catalog = Catalog::sample();
        catalog.courses.push(course("Ethics", "PHI101", "Dr. Sousa"));
        assert_eq!(
            catalog.course_schedule("Ethics"),
            "No schedule found for Ethics."
        );
    }

    #[test]
    fn test_teacher_availability() {
        let catalog = Catalog::sample();
        assert!(catalog
            .teacher_availability("Prof. Ricardo")
            .contains("online"));
        assert_eq!(
            catalog.teacher_availability("Prof. Nobody"),
            "No office hours found for Prof. Nobody."
        );
    }
}
