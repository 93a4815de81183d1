//! Course catalog boundary.
//!
//! The engine only needs to know whether a lesson belongs to a course and how many
//! lessons a course has; the catalog itself is owned elsewhere.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use learnstreak_core::{CourseId, LessonId};

pub trait Catalog: Send + Sync {
    /// Number of lessons in `course_id`; `None` when the course is unknown.
    fn total_lesson_count(&self, course_id: CourseId) -> Option<u32>;

    fn lesson_exists(&self, course_id: CourseId, lesson_id: LessonId) -> bool;
}

impl<C> Catalog for Arc<C>
where
    C: Catalog + ?Sized,
{
    fn total_lesson_count(&self, course_id: CourseId) -> Option<u32> {
        (**self).total_lesson_count(course_id)
    }

    fn lesson_exists(&self, course_id: CourseId, lesson_id: LessonId) -> bool {
        (**self).lesson_exists(course_id, lesson_id)
    }
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    courses: RwLock<HashMap<CourseId, BTreeSet<LessonId>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a course and its lessons.
    pub fn add_course(&self, course_id: CourseId, lessons: impl IntoIterator<Item = LessonId>) {
        if let Ok(mut courses) = self.courses.write() {
            courses.insert(course_id, lessons.into_iter().collect());
        }
    }

    /// Register a course with `count` freshly generated lessons and return their ids.
    pub fn add_generated_course(&self, course_id: CourseId, count: usize) -> Vec<LessonId> {
        let lessons: Vec<LessonId> = (0..count).map(|_| LessonId::new()).collect();
        self.add_course(course_id, lessons.iter().copied());
        lessons
    }
}

impl Catalog for InMemoryCatalog {
    fn total_lesson_count(&self, course_id: CourseId) -> Option<u32> {
        let courses = self.courses.read().ok()?;
        courses
            .get(&course_id)
            .map(|lessons| u32::try_from(lessons.len()).unwrap_or(u32::MAX))
    }

    fn lesson_exists(&self, course_id: CourseId, lesson_id: LessonId) -> bool {
        self.courses
            .read()
            .map(|courses| courses.get(&course_id).is_some_and(|lessons| lessons.contains(&lesson_id)))
            .unwrap_or(false)
    }
}
