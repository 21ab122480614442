mod failure_reports;
