use crate::db::models::Submission;
use crate::storage::SubmissionWithStudent;

use crate::schemas::submission::{
    format_primitive, SubmissionResponse, SubmissionWithStudentResponse,
};

pub(crate) fn submission_to_response(submission: Submission) -> SubmissionResponse {
    SubmissionResponse {
        id: submission.id,
        activity_id: submission.activity_id,
        user_id: submission.user_id,
        url: submission.url,
        grade: submission.grade,
        feedback: submission.feedback,
        attempt_count: submission.attempt_count,
        created_at: format_primitive(submission.created_at),
        last_submitted_at: format_primitive(submission.last_submitted_at),
    }
}

pub(crate) fn roster_row_to_response(row: SubmissionWithStudent) -> SubmissionWithStudentResponse {
    SubmissionWithStudentResponse {
        id: row.id,
        activity_id: row.activity_id,
        user_id: row.user_id,
        student_name: row.student_name,
        student_email: row.student_email,
        url: row.url,
        grade: row.grade,
        feedback: row.feedback,
        attempt_count: row.attempt_count,
        created_at: format_primitive(row.created_at),
        last_submitted_at: format_primitive(row.last_submitted_at),
    }
}
